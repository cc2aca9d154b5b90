//! The cluster: bounded worker pool, FIFO job queue, dispatch loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use specter_browser::{DriverFactory, Worker};
use specter_core_types::{JobId, ScanError, Scope};

use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::job::{Job, JobContext};
use crate::metrics;
use crate::model::{ClusterStatistics, JobHandler, JobStatus};
use crate::sink::ResultSink;

struct QueuedJob {
    job: Box<dyn Job>,
    attempt: u32,
}

struct ClusterInner {
    config: ClusterConfig,
    scope: Scope,
    factory: Arc<dyn DriverFactory>,
    sink: ResultSink,
    queue: Mutex<VecDeque<QueuedJob>>,
    queue_notify: Notify,
    idle: AsyncMutex<Vec<Worker>>,
    idle_notify: Notify,
    live_workers: AtomicUsize,
    drain_notify: Notify,
    shutdown: CancellationToken,
    shut_down: AtomicBool,
    degraded: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterInner {
    /// Bring one worker up, respecting the pool-size bound. `Ok(false)`
    /// means the pool is already full.
    async fn spawn_worker(&self) -> Result<bool, ClusterError> {
        let reserved = self
            .live_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                if count >= self.config.pool_size {
                    None
                } else {
                    Some(count + 1)
                }
            })
            .is_ok();
        if !reserved {
            return Ok(false);
        }

        match self.factory.spawn().await {
            Ok(driver) => {
                let worker = Worker::new(driver);
                debug!(target: "cluster", worker = %worker.id(), "worker spawned");
                self.idle.lock().await.push(worker);
                self.idle_notify.notify_one();
                Ok(true)
            }
            Err(err) => {
                self.live_workers.fetch_sub(1, Ordering::SeqCst);
                Err(ClusterError::SpawnFailed(err))
            }
        }
    }

    /// Restore the pool after a worker was retired, retrying within the
    /// configured budget.
    async fn replace_worker(&self) {
        let mut attempt = 0usize;
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            match self.spawn_worker().await {
                Ok(true) => {
                    metrics::record_respawned();
                    return;
                }
                Ok(false) => return,
                Err(err) => {
                    if attempt >= self.config.respawn_retries {
                        error!(
                            target: "cluster",
                            error = %err,
                            "respawn budget exhausted, worker pool degraded"
                        );
                        if self.live_workers.load(Ordering::SeqCst) == 0 {
                            self.degraded.store(true, Ordering::SeqCst);
                            self.fail_queued(ScanError::new("worker pool exhausted"));
                        }
                        return;
                    }
                    attempt += 1;
                    warn!(
                        target: "cluster",
                        attempt,
                        error = %err,
                        "worker respawn failed, retrying"
                    );
                    sleep(self.config.respawn_backoff).await;
                }
            }
        }
    }

    async fn retire_worker(&self, mut worker: Worker) {
        worker.retire().await;
        self.live_workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Put a worker back into the idle set, recycling it when it hit the
    /// per-worker job cap or died on the way out.
    async fn return_worker(&self, worker: Worker) {
        if self.shutdown.is_cancelled() {
            self.retire_worker(worker).await;
            return;
        }
        let cap = self.config.max_jobs_per_worker;
        if cap > 0 && worker.jobs_executed() >= cap {
            debug!(
                target: "cluster",
                worker = %worker.id(),
                age_ms = worker.age().as_millis() as u64,
                "job cap reached, recycling worker"
            );
            self.retire_worker(worker).await;
            self.replace_worker().await;
            return;
        }
        if !worker.alive().await {
            metrics::record_crashed();
            warn!(target: "cluster", worker = %worker.id(), "worker died after its job, replacing");
            self.retire_worker(worker).await;
            self.replace_worker().await;
            return;
        }
        self.idle.lock().await.push(worker);
        self.idle_notify.notify_one();
    }

    fn fail_queued(&self, error: ScanError) {
        let drained: Vec<QueuedJob> = self.queue.lock().drain(..).collect();
        for queued in drained {
            self.sink.complete(
                queued.job.id(),
                JobStatus::Failed,
                Some(error.clone()),
                Duration::ZERO,
            );
        }
        self.drain_notify.notify_waiters();
    }

    /// Requeue a crashed job if it still has retry budget and has not
    /// emitted anything (streamed results must never duplicate); fail it
    /// otherwise.
    async fn finish_failed_or_retry(
        &self,
        job: Box<dyn Job>,
        attempt: u32,
        started: Instant,
        error: ScanError,
    ) {
        let id = job.id();
        let retriable = attempt < self.config.retry.max as u32
            && self.sink.emitted(id) == 0
            && !self.shutdown.is_cancelled();
        if retriable {
            metrics::record_retried();
            debug!(target: "cluster", job = %id, attempt = attempt + 1, "requeueing job after worker crash");
            sleep(self.config.retry.backoff).await;
            self.queue.lock().push_back(QueuedJob {
                job: job.stripped(),
                attempt: attempt + 1,
            });
            self.queue_notify.notify_one();
        } else {
            metrics::record_failed();
            self.sink
                .complete(id, JobStatus::Failed, Some(error), started.elapsed());
        }
    }
}

/// Coordinator owning a bounded set of browser workers and the job queue.
///
/// Cheap to clone; all clones share the same pool. Hold one wherever jobs
/// are submitted — there is deliberately no global instance.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl Cluster {
    /// Spawn the worker pool and start the dispatch and health-monitor
    /// loops. Fails if the initial pool cannot be brought up.
    pub async fn new(
        config: ClusterConfig,
        factory: Arc<dyn DriverFactory>,
        scope: Scope,
    ) -> Result<Self, ClusterError> {
        let inner = Arc::new(ClusterInner {
            config,
            scope,
            factory,
            sink: ResultSink::new(),
            queue: Mutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
            idle: AsyncMutex::new(Vec::new()),
            idle_notify: Notify::new(),
            live_workers: AtomicUsize::new(0),
            drain_notify: Notify::new(),
            shutdown: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        for _ in 0..inner.config.pool_size {
            if let Err(err) = inner.spawn_worker().await {
                let mut idle = inner.idle.lock().await;
                for mut worker in idle.drain(..) {
                    worker.retire().await;
                }
                return Err(err);
            }
        }
        info!(target: "cluster", pool_size = inner.config.pool_size, "cluster started");

        let dispatch = tokio::spawn(dispatch_loop(Arc::clone(&inner)));
        let monitor = tokio::spawn(monitor_loop(Arc::clone(&inner)));
        inner.tasks.lock().extend([dispatch, monitor]);

        Ok(Self { inner })
    }

    /// Accept a job. Non-blocking; the job enters the FIFO wait queue and
    /// `handler` receives its streamed results and terminal update.
    pub fn queue<J, H>(&self, job: J, handler: H) -> Result<JobId, ClusterError>
    where
        J: Job + 'static,
        H: Fn(crate::model::JobUpdate) + Send + Sync + 'static,
    {
        self.queue_boxed(Box::new(job), Arc::new(handler))
    }

    pub fn queue_boxed(&self, job: Box<dyn Job>, handler: JobHandler) -> Result<JobId, ClusterError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(ClusterError::AlreadyShutDown);
        }
        if self.inner.degraded.load(Ordering::SeqCst) {
            return Err(ClusterError::PoolExhausted);
        }
        let id = job.id();
        self.inner.sink.register(id, handler);
        self.inner
            .queue
            .lock()
            .push_back(QueuedJob { job, attempt: 0 });
        self.inner.queue_notify.notify_one();
        metrics::record_queued();

        // A shutdown may have raced the submission; the job must not sit in
        // a queue nobody will drain.
        if self.inner.shut_down.load(Ordering::SeqCst) {
            self.remove_queued(id);
        }
        Ok(id)
    }

    fn remove_queued(&self, id: JobId) {
        let removed = {
            let mut queue = self.inner.queue.lock();
            let before = queue.len();
            queue.retain(|queued| queued.job.id() != id);
            before != queue.len()
        };
        if removed {
            self.inner.sink.complete(
                id,
                JobStatus::Failed,
                Some(ScanError::new("cluster shut down")),
                Duration::ZERO,
            );
            self.inner.drain_notify.notify_waiters();
        }
    }

    /// Block until every previously queued job has reached its terminal
    /// update and all callbacks have returned.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.drain_notify.notified();
            if self.inner.sink.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Drain in-flight work within the grace period, then terminate every
    /// worker and release the queue. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target: "cluster", pending = self.inner.sink.pending(), "shutting down");

        if timeout(self.inner.config.shutdown_grace, self.wait())
            .await
            .is_err()
        {
            warn!(target: "cluster", "grace period expired, terminating in-flight jobs");
        }
        self.inner.shutdown.cancel();
        self.inner.fail_queued(ScanError::new("cluster shut down"));
        let _ = timeout(self.inner.config.shutdown_grace, self.wait()).await;

        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        {
            let mut idle = self.inner.idle.lock().await;
            for mut worker in idle.drain(..) {
                worker.retire().await;
                self.inner.live_workers.fetch_sub(1, Ordering::SeqCst);
            }
        }
        self.inner.sink.close(ScanError::new("cluster shut down"));
        info!(target: "cluster", "shutdown complete");
    }

    /// Jobs queued or in flight.
    pub fn pending(&self) -> usize {
        self.inner.sink.pending()
    }

    pub fn statistics(&self) -> ClusterStatistics {
        ClusterStatistics {
            pending: self.inner.sink.pending(),
            live_workers: self.inner.live_workers.load(Ordering::SeqCst),
            counters: metrics::snapshot(),
        }
    }
}

/// Single logical scheduler: pair the head of the wait queue with any idle
/// worker, forever.
async fn dispatch_loop(inner: Arc<ClusterInner>) {
    loop {
        let queued = loop {
            if inner.shutdown.is_cancelled() {
                return;
            }
            let notified = inner.queue_notify.notified();
            if let Some(queued) = inner.queue.lock().pop_front() {
                break queued;
            }
            tokio::select! {
                _ = notified => {}
                _ = inner.shutdown.cancelled() => return,
            }
        };

        let worker = loop {
            let notified = inner.idle_notify.notified();
            if let Some(worker) = inner.idle.lock().await.pop() {
                break worker;
            }
            tokio::select! {
                _ = notified => {}
                _ = inner.shutdown.cancelled() => {
                    // Never leave a claimed job silent.
                    inner.sink.complete(
                        queued.job.id(),
                        JobStatus::Failed,
                        Some(ScanError::new("cluster shut down")),
                        Duration::ZERO,
                    );
                    inner.drain_notify.notify_waiters();
                    return;
                }
            }
        };

        metrics::record_started();
        let task_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            execute_job(task_inner, worker, queued).await;
        });
    }
}

enum RunOutcome {
    Finished(Result<Result<(), ScanError>, tokio::time::error::Elapsed>),
    Cancelled,
}

/// Run one job on one worker, enforcing its deadline and containing every
/// failure mode so nothing reaches the dispatch loop.
async fn execute_job(inner: Arc<ClusterInner>, mut worker: Worker, queued: QueuedJob) {
    let QueuedJob { job, attempt } = queued;
    let id = job.id();
    let deadline = job.timeout().unwrap_or(inner.config.job_timeout);
    let started = Instant::now();

    if let Err(err) = worker.prepare(&job.instrumentation()).await {
        warn!(target: "cluster", job = %id, worker = %worker.id(), error = %err, "worker preparation failed");
        metrics::record_crashed();
        inner.retire_worker(worker).await;
        inner
            .finish_failed_or_retry(job, attempt, started, ScanError::from(err))
            .await;
        inner.replace_worker().await;
        inner.drain_notify.notify_waiters();
        return;
    }

    let outcome = {
        let mut ctx = JobContext::new(id, &mut worker, &inner.scope, &inner.sink);
        tokio::select! {
            result = timeout(deadline, job.run(&mut ctx)) => RunOutcome::Finished(result),
            _ = inner.shutdown.cancelled() => RunOutcome::Cancelled,
        }
    };

    match outcome {
        RunOutcome::Finished(Ok(Ok(()))) => {
            worker.cleanup().await;
            metrics::record_completed();
            let time = started.elapsed();
            info!(
                target: "cluster",
                job = %id,
                worker = %worker.id(),
                time_ms = time.as_millis() as u64,
                results = inner.sink.emitted(id),
                "job completed"
            );
            inner.sink.complete(id, JobStatus::Completed, None, time);
            inner.return_worker(worker).await;
        }
        RunOutcome::Finished(Ok(Err(err))) => {
            if worker.alive().await {
                // Job-local failure; the worker itself is fine.
                worker.cleanup().await;
                metrics::record_failed();
                warn!(target: "cluster", job = %id, worker = %worker.id(), error = %err, "job failed");
                inner
                    .sink
                    .complete(id, JobStatus::Failed, Some(err), started.elapsed());
                inner.return_worker(worker).await;
            } else {
                metrics::record_crashed();
                warn!(target: "cluster", job = %id, worker = %worker.id(), error = %err, "worker crashed during job");
                inner.retire_worker(worker).await;
                inner.finish_failed_or_retry(job, attempt, started, err).await;
                inner.replace_worker().await;
            }
        }
        RunOutcome::Finished(Err(_)) => {
            // The worker is presumed hung; a hung browser may never see a
            // cooperative signal, so it is killed outright. Partial results
            // already streamed stand.
            metrics::record_timed_out();
            warn!(
                target: "cluster",
                job = %id,
                worker = %worker.id(),
                deadline_ms = deadline.as_millis() as u64,
                "job deadline exceeded, recycling worker"
            );
            inner.retire_worker(worker).await;
            inner.sink.complete(
                id,
                JobStatus::TimedOut,
                Some(ScanError::new(format!(
                    "job timed out after {}ms",
                    deadline.as_millis()
                ))),
                started.elapsed(),
            );
            inner.replace_worker().await;
        }
        RunOutcome::Cancelled => {
            inner.retire_worker(worker).await;
            inner.sink.complete(
                id,
                JobStatus::Failed,
                Some(ScanError::new("cluster shut down")),
                started.elapsed(),
            );
        }
    }
    inner.drain_notify.notify_waiters();
}

/// Periodic liveness probe over the idle set; dead workers are replaced so
/// crashes surface even between jobs.
async fn monitor_loop(inner: Arc<ClusterInner>) {
    let period = inner.config.probe_interval.max(Duration::from_millis(10));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = inner.shutdown.cancelled() => return,
        }

        let mut dead = 0usize;
        {
            let mut idle = inner.idle.lock().await;
            let mut healthy = Vec::with_capacity(idle.len());
            for mut worker in idle.drain(..) {
                if worker.alive().await {
                    healthy.push(worker);
                } else {
                    warn!(target: "cluster", worker = %worker.id(), "idle worker found dead");
                    metrics::record_crashed();
                    worker.retire().await;
                    inner.live_workers.fetch_sub(1, Ordering::SeqCst);
                    dead += 1;
                }
            }
            *idle = healthy;
        }
        for _ in 0..dead {
            inner.replace_worker().await;
        }
    }
}
