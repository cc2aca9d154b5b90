//! The Specter browser cluster.
//!
//! A bounded pool of isolated browser workers, a FIFO job queue and a single
//! dispatch loop pairing the two. Jobs are polymorphic units of DOM work;
//! their results stream back to the submitter through per-job callbacks with
//! at-most-once terminal delivery. Worker hangs and crashes are contained:
//! the offending process is killed and replaced, the job is reported, and the
//! rest of the pool keeps running.

pub mod cluster;
pub mod config;
pub mod error;
pub mod job;
pub mod jobs;
pub mod metrics;
pub mod model;
pub mod sink;

pub use cluster::Cluster;
pub use config::{ClusterConfig, RetryOpt};
pub use error::ClusterError;
pub use job::{Job, JobContext};
pub use jobs::{DomExploration, EventTrigger, PageAnalysis, ResourceExploration, TaintTrace};
pub use model::{ClusterStatistics, JobCompletion, JobHandler, JobResult, JobStatus, JobUpdate};
