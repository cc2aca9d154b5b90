use std::time::Duration;

/// Retry budget for jobs whose worker died under them.
#[derive(Clone, Debug)]
pub struct RetryOpt {
    pub max: u8,
    pub backoff: Duration,
}

impl Default for RetryOpt {
    fn default() -> Self {
        Self {
            max: 1,
            backoff: Duration::from_millis(300),
        }
    }
}

/// Cluster tunables. All decision points are configuration, not constants.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Number of concurrent browser workers.
    pub pool_size: usize,
    /// Deadline applied to jobs that do not carry their own.
    pub job_timeout: Duration,
    /// How long `shutdown` lets in-flight work drain before terminating it.
    pub shutdown_grace: Duration,
    /// Cadence of the idle-worker liveness probe.
    pub probe_interval: Duration,
    /// Attempts to bring a replacement worker up before the pool is
    /// considered degraded.
    pub respawn_retries: usize,
    pub respawn_backoff: Duration,
    /// Jobs a worker may execute before it is recycled. Zero disables
    /// recycling.
    pub max_jobs_per_worker: usize,
    pub retry: RetryOpt,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            pool_size: 6,
            job_timeout: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(5),
            probe_interval: Duration::from_millis(500),
            respawn_retries: 3,
            respawn_backoff: Duration::from_millis(250),
            max_jobs_per_worker: 100,
            retry: RetryOpt::default(),
        }
    }
}
