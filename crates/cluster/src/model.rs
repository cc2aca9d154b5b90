use std::sync::Arc;
use std::time::Duration;

use specter_core_types::{JobId, Page, ScanError, SinkRecord};

use crate::metrics::ClusterMetricsSnapshot;

/// One captured outcome of a running job, streamed to the submitter as the
/// page state is observed.
#[derive(Clone, Debug)]
pub struct JobResult {
    pub job_id: JobId,
    pub page: Page,
    pub data_flow_sinks: Vec<SinkRecord>,
    pub execution_flow_sinks: Vec<SinkRecord>,
}

impl JobResult {
    pub fn page(job_id: JobId, page: Page) -> Self {
        Self {
            job_id,
            page,
            data_flow_sinks: Vec::new(),
            execution_flow_sinks: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    Completed,
    Failed,
    TimedOut,
}

/// Terminal signal for a job. Delivered exactly once per queued job.
#[derive(Clone, Debug)]
pub struct JobCompletion {
    pub job_id: JobId,
    pub status: JobStatus,
    pub error: Option<ScanError>,
    /// Measured execution time.
    pub time: Duration,
    /// Results that were streamed before completion.
    pub results: usize,
}

impl JobCompletion {
    pub fn timed_out(&self) -> bool {
        self.status == JobStatus::TimedOut
    }
}

/// What a job callback receives: zero or more results, then one completion.
#[derive(Clone, Debug)]
pub enum JobUpdate {
    Result(JobResult),
    Completed(JobCompletion),
}

/// Per-job callback. Plain function value over owned data; the sink drops
/// its reference as soon as the terminal update has fired.
pub type JobHandler = Arc<dyn Fn(JobUpdate) + Send + Sync>;

/// Point-in-time view of the cluster, for operators and tests.
#[derive(Clone, Debug)]
pub struct ClusterStatistics {
    /// Jobs queued or in flight, i.e. not yet terminal.
    pub pending: usize,
    pub live_workers: usize,
    pub counters: ClusterMetricsSnapshot,
}
