//! Shared primitives for the Specter browser-automation cluster.
//!
//! Everything the cluster, worker and throttle crates exchange lives here:
//! ids, the workspace error type, the resource union jobs are pointed at,
//! captured page snapshots and their transition history.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

pub mod page;
pub mod scope;
pub mod taint;
pub mod transition;

pub use page::Page;
pub use scope::Scope;
pub use taint::SinkRecord;
pub use transition::{ElementRef, Transition, TransitionError, EVENT_LOAD, EVENT_REQUEST};

/// Shared error type carried across the cluster crates.
#[derive(Debug, Error, Clone)]
pub enum ScanError {
    #[error("{message}")]
    Message { message: String },
}

impl ScanError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The thing a job asks a worker to load.
///
/// Resolved to a concrete navigable target exactly once, at job-start time.
#[derive(Clone, Debug)]
pub enum Resource {
    /// Plain URL; the worker performs a full navigation.
    Url(String),
    /// Already-fetched HTTP response to be rendered without re-requesting.
    Response {
        url: String,
        status: u16,
        body: String,
    },
    /// Captured page snapshot to restore, transition history included.
    Page(Page),
}

impl Resource {
    pub fn url(&self) -> &str {
        match self {
            Resource::Url(url) => url,
            Resource::Response { url, .. } => url,
            Resource::Page(page) => &page.url,
        }
    }

    /// Copy with heavy payloads dropped, keeping only the URL.
    ///
    /// Dispatched jobs retain this form so queued retries do not pin
    /// full page graphs in memory.
    pub fn stripped(&self) -> Resource {
        Resource::Url(self.url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_url_covers_all_variants() {
        let url = Resource::Url("http://test/".into());
        assert_eq!(url.url(), "http://test/");

        let response = Resource::Response {
            url: "http://test/a".into(),
            status: 200,
            body: "<html></html>".into(),
        };
        assert_eq!(response.url(), "http://test/a");

        let page = Resource::Page(Page::new("http://test/b", 200, "", "<html></html>"));
        assert_eq!(page.url(), "http://test/b");
    }

    #[test]
    fn stripped_drops_heavy_payloads() {
        let page = Page::new("http://test/b", 200, "big body", "<html>big dom</html>");
        let resource = Resource::Page(page);
        match resource.stripped() {
            Resource::Url(url) => assert_eq!(url, "http://test/b"),
            other => panic!("expected stripped url, got {other:?}"),
        }
    }
}
