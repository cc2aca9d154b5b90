//! The job contract.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use specter_browser::{Instrumentation, Worker};
use specter_core_types::{JobId, Page, Resource, ScanError, Scope, SinkRecord};

use crate::metrics;
use crate::model::JobResult;
use crate::sink::ResultSink;

/// A unit of browser-driven work.
///
/// A job describes what a worker must do; it never owns the worker. Once
/// dispatched a job is immutable — everything it observes flows out through
/// the [`JobContext`] — so a retry can safely run a duplicate.
#[async_trait]
pub trait Job: Send + Sync {
    fn id(&self) -> JobId;

    /// What the worker should load before the job logic runs.
    fn resource(&self) -> &Resource;

    /// Per-job deadline override; the cluster default applies otherwise.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// JavaScript instrumentation the worker installs before `run`.
    fn instrumentation(&self) -> Instrumentation {
        Instrumentation::none()
    }

    /// Execute against the assigned worker, streaming results through `ctx`.
    async fn run(&self, ctx: &mut JobContext<'_>) -> Result<(), ScanError>;

    /// Duplicate for resubmission.
    fn clone_job(&self) -> Box<dyn Job>;

    /// Duplicate with heavy resource payloads dropped, keeping only the URL.
    /// Used for retries so a crashed attempt does not pin page graphs.
    fn stripped(&self) -> Box<dyn Job>;
}

/// Execution context handed to [`Job::run`]: the assigned worker, the crawl
/// scope and the result-emission hook.
pub struct JobContext<'a> {
    job_id: JobId,
    worker: &'a mut Worker,
    scope: &'a Scope,
    sink: &'a ResultSink,
}

impl<'a> JobContext<'a> {
    pub(crate) fn new(
        job_id: JobId,
        worker: &'a mut Worker,
        scope: &'a Scope,
        sink: &'a ResultSink,
    ) -> Self {
        Self {
            job_id,
            worker,
            scope,
            sink,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn worker(&mut self) -> &mut Worker {
        self.worker
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// Emit a page-only result.
    pub fn emit_page(&mut self, page: Page) -> bool {
        self.emit(page, Vec::new(), Vec::new())
    }

    /// Emit a result; pages outside the crawl scope are silently suppressed.
    pub fn emit(
        &mut self,
        page: Page,
        data_flow_sinks: Vec<SinkRecord>,
        execution_flow_sinks: Vec<SinkRecord>,
    ) -> bool {
        if !self.scope.includes(&page.url) {
            debug!(
                target: "cluster",
                job = %self.job_id,
                url = %page.url,
                "page out of scope, result suppressed"
            );
            return false;
        }
        metrics::record_result();
        self.sink.push(JobResult {
            job_id: self.job_id,
            page,
            data_flow_sinks,
            execution_flow_sinks,
        })
    }
}
