//! Taint-trace sink observations.

use serde_json::Value;

/// One observation of tainted data (or traced execution) reaching a sink
/// inside a page's JavaScript environment.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SinkRecord {
    /// Function or data location that was reached.
    pub sink: String,
    /// Taint value observed flowing into the sink, when known.
    pub taint: Option<String>,
    /// Arguments the sink was invoked with.
    pub arguments: Vec<Value>,
    /// Execution trace frames leading to the sink.
    pub trace: Vec<String>,
}

impl SinkRecord {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            ..Self::default()
        }
    }

    pub fn with_taint(mut self, taint: impl Into<String>) -> Self {
        self.taint = Some(taint.into());
        self
    }

    pub fn with_argument(mut self, argument: Value) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
}
