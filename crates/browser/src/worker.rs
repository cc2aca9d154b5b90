//! The worker: one isolated browser process plus its per-job state.

use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use specter_core_types::{ElementRef, Page, Resource, SinkRecord, Transition, WorkerId};

use crate::driver::{BrowserDriver, DriverError, EventOptions};

/// JavaScript instrumentation a job wants installed before it runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Instrumentation {
    pub taint: Option<String>,
    pub injector: Option<String>,
}

impl Instrumentation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn taint(value: impl Into<String>) -> Self {
        Self {
            taint: Some(value.into()),
            injector: None,
        }
    }

    pub fn with_injector(mut self, script: impl Into<String>) -> Self {
        self.injector = Some(script.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.taint.is_none() && self.injector.is_none()
    }
}

/// Thin state-carrying wrapper over one [`BrowserDriver`] process.
///
/// Owned exclusively by its cluster; at most one job runs on a worker at a
/// time, and instrumentation state is reset on every dispatch so nothing
/// leaks from a previous job.
pub struct Worker {
    id: WorkerId,
    driver: Box<dyn BrowserDriver>,
    instrumentation: Instrumentation,
    jobs_executed: usize,
    spawned_at: Instant,
}

impl Worker {
    pub fn new(driver: Box<dyn BrowserDriver>) -> Self {
        Self {
            id: WorkerId::new(),
            driver,
            instrumentation: Instrumentation::none(),
            jobs_executed: 0,
            spawned_at: Instant::now(),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn jobs_executed(&self) -> usize {
        self.jobs_executed
    }

    pub fn age(&self) -> std::time::Duration {
        self.spawned_at.elapsed()
    }

    /// Reset the browser for a new job and install its instrumentation.
    pub async fn prepare(&mut self, instrumentation: &Instrumentation) -> Result<(), DriverError> {
        self.instrumentation = instrumentation.clone();
        self.driver
            .install_instrumentation(
                self.instrumentation.taint.as_deref(),
                self.instrumentation.injector.as_deref(),
            )
            .await
    }

    /// Clear per-job state after a finished job.
    pub async fn cleanup(&mut self) {
        self.jobs_executed += 1;
        if !self.instrumentation.is_empty() {
            self.instrumentation = Instrumentation::none();
            if let Err(err) = self.driver.install_instrumentation(None, None).await {
                debug!(target: "browser", worker = %self.id, error = %err, "instrumentation reset failed");
            }
        }
    }

    pub async fn load(&mut self, resource: &Resource) -> Result<(), DriverError> {
        self.driver.load(resource).await
    }

    pub async fn current_page(&mut self) -> Result<Page, DriverError> {
        self.driver.current_page().await
    }

    pub async fn explorable(&mut self) -> Result<Vec<(ElementRef, String)>, DriverError> {
        self.driver.explorable().await
    }

    pub async fn trigger_event(
        &mut self,
        element: &ElementRef,
        event: &str,
        options: &EventOptions,
    ) -> Result<Option<Page>, DriverError> {
        self.driver.trigger_event(element, event, options).await
    }

    pub async fn fire_event(
        &mut self,
        element: &ElementRef,
        event: &str,
        options: &EventOptions,
    ) -> Result<bool, DriverError> {
        self.driver.fire_event(element, event, options).await
    }

    /// Fire every currently discoverable event once, without snapshot
    /// bookkeeping. Returns how many events were dispatched.
    pub async fn trigger_events(&mut self) -> Result<usize, DriverError> {
        let events = self.driver.explorable().await?;
        let mut fired = 0;
        for (element, event) in events {
            if self
                .driver
                .fire_event(&element, &event, &EventOptions::Null)
                .await?
            {
                fired += 1;
            }
        }
        Ok(fired)
    }

    pub async fn evaluate(&mut self, script: &str) -> Result<Value, DriverError> {
        self.driver.evaluate(script).await
    }

    pub async fn flush_data_flow_sinks(&mut self) -> Result<Vec<SinkRecord>, DriverError> {
        self.driver.flush_data_flow_sinks().await
    }

    pub async fn flush_execution_flow_sinks(&mut self) -> Result<Vec<SinkRecord>, DriverError> {
        self.driver.flush_execution_flow_sinks().await
    }

    /// Replay a recorded transition against the live browser.
    ///
    /// Page-load transitions perform a full navigation; everything else
    /// fires the stored event on the stored element.
    pub async fn play(&mut self, transition: &Transition) -> Result<Option<Page>, DriverError> {
        if !transition.playable() {
            return Err(DriverError::NotPlayable);
        }
        if transition.is_page_load() {
            let url = transition
                .options()
                .get("url")
                .and_then(Value::as_str)
                .ok_or(DriverError::TargetNotFound)?;
            self.load(&Resource::Url(url.to_string())).await?;
            return self.current_page().await.map(Some);
        }
        self.trigger_event(
            transition.element(),
            transition.event(),
            transition.options(),
        )
        .await
    }

    pub async fn alive(&self) -> bool {
        self.driver.is_alive().await
    }

    /// Hard-kill the underlying browser process.
    pub async fn retire(&mut self) {
        debug!(target: "browser", worker = %self.id, jobs = self.jobs_executed, "retiring worker");
        self.driver.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubPage, StubSite};
    use specter_core_types::{ElementRef, EVENT_REQUEST};

    fn single_page_worker() -> Worker {
        let site = StubSite::new().page(StubPage::new("http://test/", "<html>home</html>"));
        Worker::new(Box::new(site.driver()))
    }

    #[tokio::test]
    async fn prepare_and_cleanup_reset_instrumentation() {
        let mut worker = single_page_worker();
        worker
            .prepare(&Instrumentation::taint("marker").with_injector("init()"))
            .await
            .unwrap();
        assert_eq!(worker.jobs_executed(), 0);

        worker.cleanup().await;
        assert_eq!(worker.jobs_executed(), 1);

        // A job without instrumentation must not see leftovers.
        worker.prepare(&Instrumentation::none()).await.unwrap();
        worker.cleanup().await;
        assert_eq!(worker.jobs_executed(), 2);
    }

    #[tokio::test]
    async fn play_refuses_request_transitions() {
        let mut worker = single_page_worker();
        let transition = Transition::request("http://test/");
        let err = worker.play(&transition).await.unwrap_err();
        assert!(matches!(err, DriverError::NotPlayable));
        assert_eq!(transition.event(), EVENT_REQUEST);
    }

    #[tokio::test]
    async fn play_replays_page_loads_as_navigation() {
        let mut worker = single_page_worker();
        let transition = Transition::page_load("http://test/");
        let page = worker.play(&transition).await.unwrap().unwrap();
        assert_eq!(page.url, "http://test/");
    }

    #[tokio::test]
    async fn fire_event_reports_whether_anything_was_dispatched() {
        let site = StubSite::new()
            .page(
                StubPage::new("http://test/", "<input>").with_event(
                    ElementRef::Selector("input".into()),
                    "focus",
                    None,
                ),
            )
            .page(StubPage::new("http://test/other", "<p></p>"));
        let mut worker = Worker::new(Box::new(site.driver()));
        worker
            .load(&Resource::Url("http://test/".into()))
            .await
            .unwrap();

        let input = ElementRef::Selector("input".into());
        let missing = ElementRef::Selector("#nope".into());
        assert!(worker
            .fire_event(&input, "focus", &serde_json::Value::Null)
            .await
            .unwrap());
        assert!(!worker
            .fire_event(&missing, "focus", &serde_json::Value::Null)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn trigger_events_fires_everything_discoverable() {
        let site = StubSite::new()
            .page(
                StubPage::new("http://test/", "<a>x</a><input>")
                    .with_event(ElementRef::Selector("a".into()), "click", None)
                    .with_event(ElementRef::Selector("input".into()), "focus", None),
            );
        let mut worker = Worker::new(Box::new(site.driver()));
        worker
            .load(&Resource::Url("http://test/".into()))
            .await
            .unwrap();
        assert_eq!(worker.trigger_events().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn evaluate_runs_in_the_page_context() {
        let mut worker = single_page_worker();
        worker
            .load(&Resource::Url("http://test/".into()))
            .await
            .unwrap();
        let value = worker.evaluate("document.title").await.unwrap();
        assert!(value.is_null());
    }
}
