// src/crawl/mod.rs
//! Concurrent walk of the catalog tree.
//!
//! Tasks flow through a shared [`queue::WorkQueue`]; each worker fetches a
//! task's endpoint, decodes it, claims the records nobody else has claimed,
//! commits them and queues their children.

pub mod dedup;
pub mod progress;
pub mod queue;
pub mod task;
pub mod worker;

pub use dedup::ClaimTracker;
pub use progress::{Outcome, ProgressEvent, ProgressReporter};
pub use queue::WorkQueue;
pub use task::{Task, TaskKind};
pub use worker::{CrawlContext, TaskFailure, Tally};
