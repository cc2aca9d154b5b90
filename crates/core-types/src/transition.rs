//! Recorded DOM state changes.
//!
//! A [`Transition`] captures one element/event pair that moved the DOM from
//! one state to the next, together with how long the move took. Transitions
//! are replayable against a live worker, except for the reserved `request`
//! sentinel which marks plain HTTP fetches.

use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

/// Reserved event name for the HTTP request that produced a page.
///
/// Not a DOM event; transitions carrying it cannot be played and do not
/// count toward DOM depth.
pub const EVENT_REQUEST: &str = "request";

/// Event fired on a full page navigation.
pub const EVENT_LOAD: &str = "load";

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransitionError {
    #[error("transition is already running")]
    AlreadyRunning,
    #[error("transition has already completed")]
    Completed,
    #[error("transition was never started")]
    NotRunning,
    #[error("transition is not playable")]
    NotPlayable,
    #[error("unsupported element reference: {0}")]
    InvalidElement(String),
}

/// Accepted kinds of element references a transition may point at.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ElementRef {
    /// The document itself; used for page-level transitions.
    Document,
    /// CSS locator for the element.
    Selector(String),
    /// Position of the element in the page's explorable element list.
    Index(usize),
}

impl ElementRef {
    /// Resolve a dynamic locator value coming from the external DOM model.
    ///
    /// Anything other than the accepted kinds fails fast instead of being
    /// silently coerced.
    pub fn resolve(value: &Value) -> Result<Self, TransitionError> {
        match value {
            Value::String(s) if s == "document" => Ok(ElementRef::Document),
            Value::String(s) if !s.is_empty() => Ok(ElementRef::Selector(s.clone())),
            Value::Number(n) => n
                .as_u64()
                .map(|idx| ElementRef::Index(idx as usize))
                .ok_or_else(|| TransitionError::InvalidElement(n.to_string())),
            other => Err(TransitionError::InvalidElement(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
enum TransitionState {
    Pending,
    Running { since: Instant },
    Completed { time: Duration },
}

/// One DOM state change: element, event, options and elapsed time.
///
/// Equality and hashing cover (element, event, options) only; timing is
/// bookkeeping and never part of identity.
#[derive(Clone, Debug)]
pub struct Transition {
    element: ElementRef,
    event: String,
    options: Value,
    state: TransitionState,
}

impl Transition {
    pub fn new(element: ElementRef, event: impl Into<String>, options: Value) -> Self {
        Self {
            element,
            event: event.into(),
            options,
            state: TransitionState::Pending,
        }
    }

    /// Convenience for transitions that begin timing immediately.
    pub fn running(
        element: ElementRef,
        event: impl Into<String>,
        options: Value,
    ) -> Result<Self, TransitionError> {
        let mut transition = Self::new(element, event, options);
        transition.start()?;
        Ok(transition)
    }

    /// A completed page-load transition pointing at `url`.
    pub fn page_load(url: &str) -> Self {
        let mut transition = Self::new(
            ElementRef::Document,
            EVENT_LOAD,
            serde_json::json!({ "url": url }),
        );
        transition.state = TransitionState::Completed {
            time: Duration::ZERO,
        };
        transition
    }

    /// A completed `request` sentinel transition for the fetch of `url`.
    pub fn request(url: &str) -> Self {
        let mut transition = Self::new(
            ElementRef::Document,
            EVENT_REQUEST,
            serde_json::json!({ "url": url }),
        );
        transition.state = TransitionState::Completed {
            time: Duration::ZERO,
        };
        transition
    }

    pub fn element(&self) -> &ElementRef {
        &self.element
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn options(&self) -> &Value {
        &self.options
    }

    /// Pending → running. The timer starts here.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        match self.state {
            TransitionState::Pending => {
                self.state = TransitionState::Running {
                    since: Instant::now(),
                };
                Ok(())
            }
            TransitionState::Running { .. } => Err(TransitionError::AlreadyRunning),
            TransitionState::Completed { .. } => Err(TransitionError::Completed),
        }
    }

    /// Running → completed. Terminal; records elapsed wall time.
    pub fn complete(&mut self) -> Result<Duration, TransitionError> {
        match self.state {
            TransitionState::Running { since } => {
                let time = since.elapsed();
                self.state = TransitionState::Completed { time };
                Ok(time)
            }
            TransitionState::Pending => Err(TransitionError::NotRunning),
            TransitionState::Completed { .. } => Err(TransitionError::Completed),
        }
    }

    pub fn time(&self) -> Option<Duration> {
        match self.state {
            TransitionState::Completed { time } => Some(time),
            _ => None,
        }
    }

    pub fn completed(&self) -> bool {
        matches!(self.state, TransitionState::Completed { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TransitionState::Running { .. })
    }

    /// Whether the transition can be replayed against a live worker.
    pub fn playable(&self) -> bool {
        self.event != EVENT_REQUEST
    }

    pub fn is_page_load(&self) -> bool {
        self.element == ElementRef::Document && self.event == EVENT_LOAD
    }

    /// Contribution to cumulative DOM depth.
    pub fn depth(&self) -> usize {
        if self.playable() {
            1
        } else {
            0
        }
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
            && self.event == other.event
            && self.options == other.options
    }
}

impl Eq for Transition {}

impl Hash for Transition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.element.hash(state);
        self.event.hash(state);
        // serde_json::Value has no Hash; its canonical rendering does the job.
        self.options.to_string().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn click() -> Transition {
        Transition::new(ElementRef::Selector("#button".into()), "click", Value::Null)
    }

    #[test]
    fn start_then_complete_records_time() {
        let mut transition = click();
        transition.start().unwrap();
        assert!(transition.is_running());
        let time = transition.complete().unwrap();
        assert!(transition.completed());
        assert_eq!(transition.time(), Some(time));
    }

    #[test]
    fn start_twice_fails() {
        let mut transition = click();
        transition.start().unwrap();
        assert_eq!(transition.start(), Err(TransitionError::AlreadyRunning));
    }

    #[test]
    fn complete_without_start_fails() {
        let mut transition = click();
        assert_eq!(transition.complete(), Err(TransitionError::NotRunning));
    }

    #[test]
    fn completed_is_terminal() {
        let mut transition = click();
        transition.start().unwrap();
        transition.complete().unwrap();
        assert_eq!(transition.start(), Err(TransitionError::Completed));
        assert_eq!(transition.complete(), Err(TransitionError::Completed));
    }

    #[test]
    fn request_sentinel_is_not_playable_and_has_no_depth() {
        let transition = Transition::request("http://test/");
        assert!(!transition.playable());
        assert_eq!(transition.depth(), 0);

        let load = Transition::page_load("http://test/");
        assert!(load.playable());
        assert_eq!(load.depth(), 1);
    }

    #[test]
    fn identity_excludes_timing() {
        let mut a = click();
        let b = click();
        a.start().unwrap();
        a.complete().unwrap();
        assert_eq!(a, b);

        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn resolve_rejects_unsupported_references() {
        assert_eq!(
            ElementRef::resolve(&json!("document")),
            Ok(ElementRef::Document)
        );
        assert_eq!(
            ElementRef::resolve(&json!("#login")),
            Ok(ElementRef::Selector("#login".into()))
        );
        assert_eq!(ElementRef::resolve(&json!(3)), Ok(ElementRef::Index(3)));
        assert!(matches!(
            ElementRef::resolve(&json!({ "weird": true })),
            Err(TransitionError::InvalidElement(_))
        ));
        assert!(matches!(
            ElementRef::resolve(&json!(-1)),
            Err(TransitionError::InvalidElement(_))
        ));
    }
}
