//! Taint-trace jobs.

use std::time::Duration;

use async_trait::async_trait;

use specter_browser::Instrumentation;
use specter_core_types::{JobId, Resource, ScanError};

use crate::job::{Job, JobContext};
use crate::jobs::{explore, Capture};

/// DOM exploration with a taint tracer layered on top.
///
/// Before the worker loads anything, the taint marker (and an optional
/// injector script) is installed into its JavaScript environment. The
/// exploration then only captures page states where the tracer observed the
/// taint reaching a data-flow sink, or a watched sink function executing at
/// all — the two trace modes are independent and both are reported.
#[derive(Clone, Debug)]
pub struct TaintTrace {
    id: JobId,
    resource: Resource,
    taint: String,
    injector: Option<String>,
    timeout: Option<Duration>,
}

impl TaintTrace {
    pub fn new(resource: Resource, taint: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            resource,
            taint: taint.into(),
            injector: None,
            timeout: None,
        }
    }

    /// Custom script injected into every page before its own code runs.
    pub fn with_injector(mut self, script: impl Into<String>) -> Self {
        self.injector = Some(script.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn taint(&self) -> &str {
        &self.taint
    }
}

#[async_trait]
impl Job for TaintTrace {
    fn id(&self) -> JobId {
        self.id
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn instrumentation(&self) -> Instrumentation {
        let instrumentation = Instrumentation::taint(&self.taint);
        match &self.injector {
            Some(script) => instrumentation.with_injector(script.clone()),
            None => instrumentation,
        }
    }

    async fn run(&self, ctx: &mut JobContext<'_>) -> Result<(), ScanError> {
        explore(ctx, &self.resource, Capture::SinkObservations).await
    }

    fn clone_job(&self) -> Box<dyn Job> {
        Box::new(self.clone())
    }

    fn stripped(&self) -> Box<dyn Job> {
        Box::new(Self {
            id: self.id,
            resource: self.resource.stripped(),
            taint: self.taint.clone(),
            injector: self.injector.clone(),
            timeout: self.timeout,
        })
    }
}
