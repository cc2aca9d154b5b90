//! Per-job result delivery.
//!
//! The sink owns the job-id → callback association. Results stream through
//! `push` while the job runs; `complete` claims the entry atomically so the
//! terminal update fires at most once, and the callback is dropped the moment
//! it has fired. After `close` nothing is ever invoked again.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use specter_core_types::{JobId, ScanError};

use crate::model::{JobCompletion, JobHandler, JobResult, JobStatus, JobUpdate};

struct SinkEntry {
    handler: JobHandler,
    emitted: AtomicUsize,
}

pub struct ResultSink {
    entries: DashMap<JobId, SinkEntry>,
    /// Jobs registered but not yet terminal. Decremented only after the
    /// terminal callback has returned, so `wait` barriers cover callbacks.
    open: AtomicUsize,
    closed: AtomicBool,
}

impl ResultSink {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            open: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn register(&self, id: JobId, handler: JobHandler) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(id, SinkEntry {
            handler,
            emitted: AtomicUsize::new(0),
        });
    }

    /// Forward one streamed result to its job's callback.
    pub fn push(&self, result: JobResult) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let handler = match self.entries.get(&result.job_id) {
            Some(entry) => {
                entry.emitted.fetch_add(1, Ordering::SeqCst);
                entry.handler.clone()
            }
            None => return false,
        };
        // Guard dropped above; the callback may queue new jobs freely.
        handler(JobUpdate::Result(result));
        true
    }

    /// Results streamed so far for `id`.
    pub fn emitted(&self, id: JobId) -> usize {
        self.entries
            .get(&id)
            .map(|entry| entry.emitted.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Deliver the terminal update for `id`. Returns false if the job was
    /// already terminal.
    pub fn complete(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<ScanError>,
        time: Duration,
    ) -> bool {
        let Some((_, entry)) = self.entries.remove(&id) else {
            return false;
        };
        let completion = JobCompletion {
            job_id: id,
            status,
            error,
            time,
            results: entry.emitted.load(Ordering::SeqCst),
        };
        (entry.handler)(JobUpdate::Completed(completion));
        self.open.fetch_sub(1, Ordering::SeqCst);
        true
    }

    /// Jobs still awaiting their terminal update.
    pub fn pending(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Fail whatever is left and refuse all further delivery.
    pub fn close(&self, error: ScanError) {
        let ids: Vec<JobId> = self.entries.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.complete(id, JobStatus::Failed, Some(error.clone()), Duration::ZERO);
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specter_core_types::Page;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn page() -> Page {
        Page::new("http://test/", 200, "", "<html></html>")
    }

    #[test]
    fn complete_fires_at_most_once() {
        let sink = ResultSink::new();
        let id = JobId::new();
        let terminals = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&terminals);
        sink.register(
            id,
            Arc::new(move |update| {
                if matches!(update, JobUpdate::Completed(_)) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        assert!(sink.complete(id, JobStatus::Completed, None, Duration::ZERO));
        assert!(!sink.complete(id, JobStatus::Failed, None, Duration::ZERO));
        assert_eq!(terminals.load(Ordering::SeqCst), 1);
        assert_eq!(sink.pending(), 0);
    }

    #[test]
    fn results_are_counted_into_the_completion() {
        let sink = ResultSink::new();
        let id = JobId::new();
        let results = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&results);
        sink.register(
            id,
            Arc::new(move |update| {
                if let JobUpdate::Completed(completion) = update {
                    seen.store(completion.results, Ordering::SeqCst);
                }
            }),
        );

        sink.push(JobResult::page(id, page()));
        sink.push(JobResult::page(id, page()));
        sink.complete(id, JobStatus::Completed, None, Duration::ZERO);
        assert_eq!(results.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_fails_leftovers_then_goes_silent() {
        let sink = ResultSink::new();
        let id = JobId::new();
        let updates = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&updates);
        sink.register(
            id,
            Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        sink.close(ScanError::new("cluster shut down"));
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(sink.pending(), 0);

        // Nothing fires after close.
        assert!(!sink.push(JobResult::page(id, page())));
        let other = JobId::new();
        sink.register(other, Arc::new(|_| panic!("registered after close")));
        assert!(!sink.complete(other, JobStatus::Completed, None, Duration::ZERO));
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }
}
