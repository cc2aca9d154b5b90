//! Captured page snapshots.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::transition::Transition;

/// Snapshot of one DOM state: URL, serialized body, DOM rendering and the
/// transition history that produced it.
///
/// The cluster treats pages as opaque values; equality and hashing are
/// defined over the DOM digest so exploration can deduplicate states that
/// render identically regardless of how they were reached.
#[derive(Clone, Debug)]
pub struct Page {
    pub url: String,
    pub code: u16,
    pub body: String,
    pub dom: String,
    pub transitions: Vec<Transition>,
}

impl Page {
    pub fn new(
        url: impl Into<String>,
        code: u16,
        body: impl Into<String>,
        dom: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            code,
            body: body.into(),
            dom: dom.into(),
            transitions: Vec::new(),
        }
    }

    pub fn with_transitions(mut self, transitions: Vec<Transition>) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn push_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Stable digest of the rendered DOM, used to deduplicate explored states.
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.dom.hash(&mut hasher);
        hasher.finish()
    }

    /// Cumulative DOM depth: number of depth-contributing transitions in the
    /// page's history.
    pub fn dom_depth(&self) -> usize {
        self.transitions.iter().map(Transition::depth).sum()
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.digest() == other.digest()
    }
}

impl Eq for Page {}

impl Hash for Page {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.digest());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::{ElementRef, Transition};
    use serde_json::Value;

    #[test]
    fn equality_is_dom_based() {
        let a = Page::new("http://test/a", 200, "", "<p>same</p>");
        let b = Page::new("http://test/b", 404, "other body", "<p>same</p>");
        let c = Page::new("http://test/a", 200, "", "<p>different</p>");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn dom_depth_skips_request_transitions() {
        let mut page = Page::new("http://test/", 200, "", "<html></html>");
        page.push_transition(Transition::request("http://test/"));
        page.push_transition(Transition::page_load("http://test/"));
        page.push_transition(Transition::new(
            ElementRef::Selector("#button".into()),
            "click",
            Value::Null,
        ));
        assert_eq!(page.dom_depth(), 2);
    }
}
