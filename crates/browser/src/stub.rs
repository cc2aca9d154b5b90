//! Scripted in-process driver.
//!
//! Stands in for a real engine binding during tests and local bring-up: a
//! [`StubSite`] maps (page, element, event) to successor page states, and the
//! driver walks it the way a browser would, including scripted hangs and
//! crashes for the failure paths.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use specter_core_types::{ElementRef, Page, Resource, SinkRecord, Transition};

use crate::driver::{BrowserDriver, DriverError, DriverFactory, EventOptions};

/// One scripted event handler on a stub page.
#[derive(Clone, Debug)]
pub struct StubEvent {
    pub element: ElementRef,
    pub event: String,
    /// URL of the page state the event leads to; `None` leaves the DOM as is.
    pub leads_to: Option<String>,
}

/// One scripted page state.
#[derive(Clone, Debug)]
pub struct StubPage {
    pub url: String,
    pub code: u16,
    pub body: String,
    pub dom: String,
    pub events: Vec<StubEvent>,
    pub hang_on_load: bool,
    pub crash_on_load: bool,
    pub data_flow_sinks: Vec<SinkRecord>,
    pub execution_flow_sinks: Vec<SinkRecord>,
}

impl StubPage {
    pub fn new(url: impl Into<String>, dom: impl Into<String>) -> Self {
        let dom = dom.into();
        Self {
            url: url.into(),
            code: 200,
            body: dom.clone(),
            dom,
            events: Vec::new(),
            hang_on_load: false,
            crash_on_load: false,
            data_flow_sinks: Vec::new(),
            execution_flow_sinks: Vec::new(),
        }
    }

    pub fn with_status(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_event(
        mut self,
        element: ElementRef,
        event: impl Into<String>,
        leads_to: Option<&str>,
    ) -> Self {
        self.events.push(StubEvent {
            element,
            event: event.into(),
            leads_to: leads_to.map(str::to_string),
        });
        self
    }

    /// Loading this page never returns, like a page stuck in an infinite
    /// script loop.
    pub fn hanging(mut self) -> Self {
        self.hang_on_load = true;
        self
    }

    /// Loading this page takes the browser process down.
    pub fn crashing(mut self) -> Self {
        self.crash_on_load = true;
        self
    }

    pub fn with_data_flow_sink(mut self, record: SinkRecord) -> Self {
        self.data_flow_sinks.push(record);
        self
    }

    pub fn with_execution_flow_sink(mut self, record: SinkRecord) -> Self {
        self.execution_flow_sinks.push(record);
        self
    }
}

/// The scripted site a [`StubDriver`] navigates.
#[derive(Clone, Debug, Default)]
pub struct StubSite {
    pages: HashMap<String, StubPage>,
}

impl StubSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: StubPage) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    pub fn driver(&self) -> StubDriver {
        StubDriver::new(Arc::new(self.clone()))
    }

    pub fn factory(self) -> StubFactory {
        StubFactory::new(self)
    }

    fn get(&self, url: &str) -> Option<&StubPage> {
        self.pages.get(url)
    }
}

/// Scripted [`BrowserDriver`] implementation.
pub struct StubDriver {
    site: Arc<StubSite>,
    current: Option<String>,
    history: Vec<Transition>,
    taint: Option<String>,
    injector: Option<String>,
    pending_data_flow: Vec<SinkRecord>,
    pending_execution_flow: Vec<SinkRecord>,
    evaluated: Vec<String>,
    alive: AtomicBool,
}

impl StubDriver {
    pub fn new(site: Arc<StubSite>) -> Self {
        Self {
            site,
            current: None,
            history: Vec::new(),
            taint: None,
            injector: None,
            pending_data_flow: Vec::new(),
            pending_execution_flow: Vec::new(),
            evaluated: Vec::new(),
            alive: AtomicBool::new(true),
        }
    }

    /// Scripts evaluated so far, for assertions.
    pub fn evaluated(&self) -> &[String] {
        &self.evaluated
    }

    fn check_alive(&self) -> Result<(), DriverError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::Crashed)
        }
    }

    fn current_stub(&self) -> Result<&StubPage, DriverError> {
        let url = self
            .current
            .as_deref()
            .ok_or_else(|| DriverError::Io("no page loaded".into()))?;
        self.site
            .get(url)
            .ok_or_else(|| DriverError::Io(format!("unknown page {url}")))
    }

    fn snapshot(&self) -> Result<Page, DriverError> {
        let stub = self.current_stub()?;
        Ok(
            Page::new(stub.url.clone(), stub.code, stub.body.clone(), stub.dom.clone())
                .with_transitions(self.history.clone()),
        )
    }

    fn collect_sinks(&mut self, url: &str) {
        if self.taint.is_none() {
            return;
        }
        if let Some(stub) = self.site.get(url) {
            self.pending_data_flow.extend(stub.data_flow_sinks.clone());
            self.pending_execution_flow
                .extend(stub.execution_flow_sinks.clone());
        }
    }

    fn apply_event(
        &mut self,
        element: &ElementRef,
        event: &str,
        options: &EventOptions,
    ) -> Result<Option<bool>, DriverError> {
        self.check_alive()?;
        let handler = self
            .current_stub()?
            .events
            .iter()
            .find(|handler| &handler.element == element && handler.event == event)
            .cloned();

        let Some(handler) = handler else {
            return Ok(None);
        };

        let Some(successor) = handler.leads_to else {
            return Ok(Some(false));
        };
        if self.site.get(&successor).is_none() {
            return Err(DriverError::TargetNotFound);
        }

        let mut transition = Transition::running(element.clone(), event, options.clone())
            .map_err(|err| DriverError::Io(err.to_string()))?;
        transition
            .complete()
            .map_err(|err| DriverError::Io(err.to_string()))?;
        self.history.push(transition);
        self.current = Some(successor.clone());
        self.collect_sinks(&successor);
        Ok(Some(true))
    }
}

#[async_trait]
impl BrowserDriver for StubDriver {
    async fn load(&mut self, resource: &Resource) -> Result<(), DriverError> {
        self.check_alive()?;
        let url = resource.url().to_string();
        let stub = self
            .site
            .get(&url)
            .ok_or_else(|| DriverError::LoadFailed {
                url: url.clone(),
                reason: "no such page".into(),
            })?
            .clone();

        if stub.crash_on_load {
            self.alive.store(false, Ordering::SeqCst);
            return Err(DriverError::Crashed);
        }
        if stub.hang_on_load {
            std::future::pending::<()>().await;
        }

        self.current = Some(url.clone());
        self.history = vec![Transition::request(&url), Transition::page_load(&url)];
        self.collect_sinks(&url);
        Ok(())
    }

    async fn current_page(&mut self) -> Result<Page, DriverError> {
        self.check_alive()?;
        self.snapshot()
    }

    async fn explorable(&mut self) -> Result<Vec<(ElementRef, String)>, DriverError> {
        self.check_alive()?;
        Ok(self
            .current_stub()?
            .events
            .iter()
            .map(|handler| (handler.element.clone(), handler.event.clone()))
            .collect())
    }

    async fn trigger_event(
        &mut self,
        element: &ElementRef,
        event: &str,
        options: &EventOptions,
    ) -> Result<Option<Page>, DriverError> {
        match self.apply_event(element, event, options)? {
            Some(true) => self.snapshot().map(Some),
            _ => Ok(None),
        }
    }

    async fn fire_event(
        &mut self,
        element: &ElementRef,
        event: &str,
        options: &EventOptions,
    ) -> Result<bool, DriverError> {
        Ok(self.apply_event(element, event, options)?.is_some())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, DriverError> {
        self.check_alive()?;
        self.evaluated.push(script.to_string());
        Ok(Value::Null)
    }

    async fn install_instrumentation(
        &mut self,
        taint: Option<&str>,
        injector: Option<&str>,
    ) -> Result<(), DriverError> {
        self.check_alive()?;
        self.taint = taint.map(str::to_string);
        self.injector = injector.map(str::to_string);
        self.pending_data_flow.clear();
        self.pending_execution_flow.clear();
        Ok(())
    }

    async fn flush_data_flow_sinks(&mut self) -> Result<Vec<SinkRecord>, DriverError> {
        self.check_alive()?;
        Ok(mem::take(&mut self.pending_data_flow))
    }

    async fn flush_execution_flow_sinks(&mut self) -> Result<Vec<SinkRecord>, DriverError> {
        self.check_alive()?;
        Ok(mem::take(&mut self.pending_execution_flow))
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn kill(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// [`DriverFactory`] spawning [`StubDriver`]s, with spawn-failure injection
/// for pool-recovery tests.
#[derive(Clone)]
pub struct StubFactory {
    site: Arc<StubSite>,
    spawned: Arc<AtomicUsize>,
    fail_spawns: Arc<AtomicUsize>,
}

impl StubFactory {
    pub fn new(site: StubSite) -> Self {
        Self {
            site: Arc::new(site),
            spawned: Arc::new(AtomicUsize::new(0)),
            fail_spawns: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Total drivers handed out so far.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Make the next `count` spawns fail.
    pub fn fail_next_spawns(&self, count: usize) {
        self.fail_spawns.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl DriverFactory for StubFactory {
    async fn spawn(&self) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let failing = self
            .fail_spawns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(DriverError::Io("spawn refused".into()));
        }
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubDriver::new(Arc::clone(&self.site))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::BrowserDriver;

    fn two_state_site() -> StubSite {
        StubSite::new()
            .page(
                StubPage::new("http://test/", "<button>go</button>").with_event(
                    ElementRef::Selector("button".into()),
                    "click",
                    Some("http://test/#after"),
                ),
            )
            .page(StubPage::new(
                "http://test/#after",
                "<button>go</button><a href=\"/next\">next</a>",
            ))
    }

    #[tokio::test]
    async fn load_then_trigger_walks_the_site() {
        let mut driver = two_state_site().driver();
        driver.load(&Resource::Url("http://test/".into())).await.unwrap();

        let initial = driver.current_page().await.unwrap();
        assert_eq!(initial.url, "http://test/");
        assert_eq!(initial.dom_depth(), 1); // request + load

        let events = driver.explorable().await.unwrap();
        assert_eq!(events.len(), 1);

        let page = driver
            .trigger_event(&events[0].0, &events[0].1, &Value::Null)
            .await
            .unwrap()
            .expect("click changes the dom");
        assert!(page.dom.contains("next"));
        assert_eq!(page.dom_depth(), 2);
    }

    #[tokio::test]
    async fn unknown_event_is_not_an_error() {
        let mut driver = two_state_site().driver();
        driver.load(&Resource::Url("http://test/".into())).await.unwrap();
        let result = driver
            .trigger_event(
                &ElementRef::Selector("#missing".into()),
                "click",
                &Value::Null,
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn crash_page_kills_the_driver() {
        let site = StubSite::new().page(StubPage::new("http://test/boom", "x").crashing());
        let mut driver = site.driver();
        let err = driver
            .load(&Resource::Url("http://test/boom".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Crashed));
        assert!(err.retriable());
        assert!(!driver.is_alive().await);
    }

    #[tokio::test]
    async fn loading_an_unknown_page_is_not_retriable() {
        let mut driver = two_state_site().driver();
        let err = driver
            .load(&Resource::Url("http://test/missing".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::LoadFailed { .. }));
        assert!(!err.retriable());
    }

    #[tokio::test]
    async fn sinks_flush_only_under_instrumentation() {
        let site = StubSite::new().page(
            StubPage::new("http://test/", "<html></html>")
                .with_data_flow_sink(SinkRecord::new("eval").with_taint("marker")),
        );

        let mut plain = site.driver();
        plain.load(&Resource::Url("http://test/".into())).await.unwrap();
        assert!(plain.flush_data_flow_sinks().await.unwrap().is_empty());

        let mut traced = site.driver();
        traced
            .install_instrumentation(Some("marker"), None)
            .await
            .unwrap();
        traced.load(&Resource::Url("http://test/".into())).await.unwrap();
        let sinks = traced.flush_data_flow_sinks().await.unwrap();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].sink, "eval");
        // drained
        assert!(traced.flush_data_flow_sinks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn factory_failure_injection() {
        let factory = two_state_site().factory();
        factory.fail_next_spawns(1);
        assert!(factory.spawn().await.is_err());
        assert!(factory.spawn().await.is_ok());
        assert_eq!(factory.spawned(), 1);
    }
}
