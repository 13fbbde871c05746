//! # Filing Orchestration
//!
//! Everything between a decoded [`FilingEvent`](crate::messaging::FilingEvent)
//! and a committed, published filing.
//!
//! ## Core Components
//!
//! - **FilingLoader**: reads the filing aggregate under the per-filing lock
//! - **FilingOrchestrator**: runs the pipeline state machine, persists and publishes
//! - **ErrorClassifier**: maps a failure and delivery attempt to retry, dead-letter or drop

pub mod error_classifier;
pub mod filing_orchestrator;
pub mod loader;

pub use error_classifier::{ErrorClassifier, FailureDisposition};
pub use filing_orchestrator::{FilingOrchestrator, ProcessingOutcome};
pub use loader::{FilingLoader, LoadedAggregate};
