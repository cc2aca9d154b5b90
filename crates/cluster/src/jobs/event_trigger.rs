//! Single-event jobs.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use specter_core_types::{JobId, Resource, ScanError};

use crate::job::{Job, JobContext};

/// Load a resource and fire exactly one named event on one element,
/// identified by its position in the page's explorable element list.
///
/// Produces a single result, or none when the element/event pairing no
/// longer applies on the loaded page.
#[derive(Clone, Debug)]
pub struct EventTrigger {
    id: JobId,
    resource: Resource,
    element_index: usize,
    event: String,
    options: Value,
    timeout: Option<Duration>,
}

impl EventTrigger {
    pub fn new(resource: Resource, element_index: usize, event: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            resource,
            element_index,
            event: event.into(),
            options: Value::Null,
            timeout: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Job for EventTrigger {
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
        ctx.worker().load(&self.resource).await?;

        let events = ctx.worker().explorable().await?;
        let Some((element, available)) = events.get(self.element_index).cloned() else {
            return Ok(());
        };
        if available != self.event {
            return Ok(());
        }

        let changed = ctx
            .worker()
            .trigger_event(&element, &self.event, &self.options)
            .await?;
        if let Some(page) = changed {
            ctx.emit_page(page);
        }
        Ok(())
    }

    fn clone_job(&self) -> Box<dyn Job> {
        Box::new(self.clone())
    }

    fn stripped(&self) -> Box<dyn Job> {
        Box::new(Self {
            id: self.id,
            resource: self.resource.stripped(),
            element_index: self.element_index,
            event: self.event.clone(),
            options: self.options.clone(),
            timeout: self.timeout,
        })
    }
}
