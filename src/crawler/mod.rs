//! Crawler module: the staged task pipeline
//!
//! This module contains the core crawling machinery, including:
//! - Fetch, parse and save tasks and their queue ordering
//! - Stage queues tied to shared progress counters
//! - The admission filter guarding the fetch stage
//! - The generic worker loop and its quiescence-based termination
//! - Overall run coordination

mod coordinator;
pub mod counters;
pub mod filter;
mod pipeline;
pub mod scheduler;
pub mod task;
mod worker;

pub use coordinator::{run_crawl, Coordinator};
pub use counters::{CounterSnapshot, SharedCounters};
pub use filter::{AdmissionFilter, Membership};
pub use pipeline::Pipeline;
pub use scheduler::{FifoBuffer, PriorityBuffer, StageQueue, TaskBuffer};
pub use task::{FetchTask, ParseTask, SaveTask, Stage, Task};
pub use worker::{run_worker, Capability};
