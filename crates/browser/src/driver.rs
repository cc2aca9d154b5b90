//! The external browser-engine seam.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use specter_core_types::{ElementRef, Page, Resource, ScanError, SinkRecord};

/// Options forwarded verbatim to the engine when firing an event.
pub type EventOptions = Value;

/// Failures surfaced by a driver implementation.
#[derive(Clone, Debug, Error)]
pub enum DriverError {
    #[error("browser process crashed")]
    Crashed,
    #[error("failed to load {url}: {reason}")]
    LoadFailed { url: String, reason: String },
    #[error("script evaluation failed: {0}")]
    Evaluate(String),
    #[error("target element not found")]
    TargetNotFound,
    #[error("transition is not playable")]
    NotPlayable,
    #[error("browser i/o failure: {0}")]
    Io(String),
}

impl DriverError {
    /// Whether the operation may succeed against a fresh browser process.
    pub fn retriable(&self) -> bool {
        matches!(self, DriverError::Crashed | DriverError::Io(_))
    }
}

impl From<DriverError> for ScanError {
    fn from(value: DriverError) -> Self {
        ScanError::new(value.to_string())
    }
}

/// Operations one isolated browser process exposes to the cluster.
///
/// This core defines the contract only; wiring it to a concrete engine
/// protocol lives outside. Implementations must tolerate `kill` at any point
/// and report death through `is_alive` / [`DriverError::Crashed`] rather than
/// panicking.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to (or restore) the given resource.
    async fn load(&mut self, resource: &Resource) -> Result<(), DriverError>;

    /// Snapshot of the current DOM state, transition history included.
    async fn current_page(&mut self) -> Result<Page, DriverError>;

    /// Element/event pairs currently discoverable on the page.
    async fn explorable(&mut self) -> Result<Vec<(ElementRef, String)>, DriverError>;

    /// Fire `event` on `element` and report the resulting page if the DOM
    /// changed. `None` means the event no longer applies or changed nothing.
    async fn trigger_event(
        &mut self,
        element: &ElementRef,
        event: &str,
        options: &EventOptions,
    ) -> Result<Option<Page>, DriverError>;

    /// Low-level event dispatch without snapshot diffing.
    async fn fire_event(
        &mut self,
        element: &ElementRef,
        event: &str,
        options: &EventOptions,
    ) -> Result<bool, DriverError>;

    /// Evaluate a script in the page's JavaScript context.
    async fn evaluate(&mut self, script: &str) -> Result<Value, DriverError>;

    /// Install (or clear, when both are `None`) the taint marker and custom
    /// injected code for the next page loads.
    async fn install_instrumentation(
        &mut self,
        taint: Option<&str>,
        injector: Option<&str>,
    ) -> Result<(), DriverError>;

    /// Drain data-flow sink observations accumulated since the last flush.
    async fn flush_data_flow_sinks(&mut self) -> Result<Vec<SinkRecord>, DriverError>;

    /// Drain execution-flow sink observations accumulated since the last flush.
    async fn flush_execution_flow_sinks(&mut self) -> Result<Vec<SinkRecord>, DriverError>;

    /// Liveness probe; must not block on a hung process.
    async fn is_alive(&self) -> bool;

    /// Hard-kill the underlying process. Idempotent.
    async fn kill(&mut self);
}

/// Spawns fresh driver processes; the cluster holds one to replace crashed
/// or retired workers.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn spawn(&self) -> Result<Box<dyn BrowserDriver>, DriverError>;
}
