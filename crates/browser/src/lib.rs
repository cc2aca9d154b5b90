//! Browser worker layer for the Specter cluster.
//!
//! The cluster never talks to a browser engine directly. It goes through the
//! [`BrowserDriver`] trait, an external seam a concrete engine binding plugs
//! into, and [`Worker`], the thin state-carrying wrapper the dispatch loop
//! hands jobs to. [`StubDriver`] is the scripted in-process implementation
//! used by tests and local bring-up.

pub mod driver;
pub mod stub;
pub mod worker;

pub use driver::{BrowserDriver, DriverError, DriverFactory, EventOptions};
pub use stub::{StubDriver, StubEvent, StubFactory, StubPage, StubSite};
pub use worker::{Instrumentation, Worker};
