use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    crashed: AtomicU64,
    respawned: AtomicU64,
    retried: AtomicU64,
    results: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_queued() {
    increment(&COUNTERS.queued);
}

pub fn record_started() {
    increment(&COUNTERS.started);
}

pub fn record_completed() {
    increment(&COUNTERS.completed);
}

pub fn record_failed() {
    increment(&COUNTERS.failed);
}

pub fn record_timed_out() {
    increment(&COUNTERS.timed_out);
}

pub fn record_crashed() {
    increment(&COUNTERS.crashed);
}

pub fn record_respawned() {
    increment(&COUNTERS.respawned);
}

pub fn record_retried() {
    increment(&COUNTERS.retried);
}

pub fn record_result() {
    increment(&COUNTERS.results);
}

#[derive(Clone, Debug, Default)]
pub struct ClusterMetricsSnapshot {
    pub queued: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub crashed: u64,
    pub respawned: u64,
    pub retried: u64,
    pub results: u64,
}

pub fn snapshot() -> ClusterMetricsSnapshot {
    ClusterMetricsSnapshot {
        queued: COUNTERS.queued.load(Ordering::Relaxed),
        started: COUNTERS.started.load(Ordering::Relaxed),
        completed: COUNTERS.completed.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        timed_out: COUNTERS.timed_out.load(Ordering::Relaxed),
        crashed: COUNTERS.crashed.load(Ordering::Relaxed),
        respawned: COUNTERS.respawned.load(Ordering::Relaxed),
        retried: COUNTERS.retried.load(Ordering::Relaxed),
        results: COUNTERS.results.load(Ordering::Relaxed),
    }
}
