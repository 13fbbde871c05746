//! # Execution
//!
//! Queue consumers that feed filing events into the orchestrator.

pub mod worker_pool;

pub use worker_pool::{FilingWorkerPool, MessageOutcome, WorkerPoolStats, WorkerPoolStatsSnapshot};
