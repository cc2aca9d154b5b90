//! Exploration-family jobs: load a resource and walk its DOM event surface.

use std::time::Duration;

use async_trait::async_trait;

use specter_core_types::{JobId, Resource, ScanError};

use crate::job::{Job, JobContext};
use crate::jobs::{explore, Capture};

/// Load a resource, then trigger every discoverable DOM event, emitting one
/// result per newly observed page state.
#[derive(Clone, Debug)]
pub struct ResourceExploration {
    id: JobId,
    resource: Resource,
    timeout: Option<Duration>,
}

impl ResourceExploration {
    pub fn new(resource: Resource) -> Self {
        Self {
            id: JobId::new(),
            resource,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Job for ResourceExploration {
    fn id(&self) -> JobId {
        self.id
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run(&self, ctx: &mut JobContext<'_>) -> Result<(), ScanError> {
        explore(ctx, &self.resource, Capture::EveryNewPage).await
    }

    fn clone_job(&self) -> Box<dyn Job> {
        Box::new(self.clone())
    }

    fn stripped(&self) -> Box<dyn Job> {
        Box::new(Self {
            id: self.id,
            resource: self.resource.stripped(),
            timeout: self.timeout,
        })
    }
}

/// The plain "load and explore" job; base behavior for taint tracing.
#[derive(Clone, Debug)]
pub struct DomExploration {
    id: JobId,
    resource: Resource,
    timeout: Option<Duration>,
}

impl DomExploration {
    pub fn new(resource: Resource) -> Self {
        Self {
            id: JobId::new(),
            resource,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Job for DomExploration {
    fn id(&self) -> JobId {
        self.id
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run(&self, ctx: &mut JobContext<'_>) -> Result<(), ScanError> {
        explore(ctx, &self.resource, Capture::EveryNewPage).await
    }

    fn clone_job(&self) -> Box<dyn Job> {
        Box::new(self.clone())
    }

    fn stripped(&self) -> Box<dyn Job> {
        Box::new(Self {
            id: self.id,
            resource: self.resource.stripped(),
            timeout: self.timeout,
        })
    }
}

/// Generic page analysis: load, trigger everything, no result filtering
/// beyond scope checks.
#[derive(Clone, Debug)]
pub struct PageAnalysis {
    id: JobId,
    resource: Resource,
    timeout: Option<Duration>,
}

impl PageAnalysis {
    pub fn new(resource: Resource) -> Self {
        Self {
            id: JobId::new(),
            resource,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Job for PageAnalysis {
    fn id(&self) -> JobId {
        self.id
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run(&self, ctx: &mut JobContext<'_>) -> Result<(), ScanError> {
        explore(ctx, &self.resource, Capture::EveryNewPage).await
    }

    fn clone_job(&self) -> Box<dyn Job> {
        Box::new(self.clone())
    }

    fn stripped(&self) -> Box<dyn Job> {
        Box::new(Self {
            id: self.id,
            resource: self.resource.stripped(),
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specter_core_types::Page;

    #[test]
    fn duplicates_keep_the_job_identity() {
        let job = ResourceExploration::new(Resource::Url("http://test/".into()))
            .with_timeout(Duration::from_secs(3));
        let copy = job.clone_job();
        assert_eq!(copy.id(), job.id());
        assert_eq!(copy.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(copy.resource().url(), "http://test/");
    }

    #[test]
    fn stripped_copies_drop_page_payloads() {
        let page = Page::new("http://test/heavy", 200, "body", "<html>heavy</html>");
        let job = DomExploration::new(Resource::Page(page));
        let stripped = job.stripped();
        assert_eq!(stripped.id(), job.id());
        assert!(matches!(stripped.resource(), Resource::Url(url) if url == "http://test/heavy"));
    }
}
