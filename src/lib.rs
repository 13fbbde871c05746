#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Filing Processor
//!
//! Queue-driven processor that applies corporate registry filings to business
//! aggregates.
//!
//! ## Overview
//!
//! Each inbound event references a submitted filing by id. The processor loads
//! the filing and its business, dispatches to the processor for the filing
//! type, commits the mutated aggregate atomically and then publishes follow-on
//! events (completion email, business-number sync, credential revocation).
//!
//! ## Architecture
//!
//! ```text
//! queue ─▶ FilingWorkerPool ─▶ FilingOrchestrator ─▶ FilingStore (unit of work)
//!                                   │                      │
//!                                   ├─ ProcessorRegistry   └─ per-filing lock
//!                                   └─ OutcomePublisher ─▶ email / bn / credentials
//! ```
//!
//! Delivery is at-least-once. Reprocessing a COMPLETED filing is a no-op, so
//! redeliveries are safe.
//!
//! ## Module Organization
//!
//! - [`messaging`] - broker abstraction, pgmq and in-memory adapters, event decoding
//! - [`database`] - unit of work over PostgreSQL or memory
//! - [`models`] - filing and business aggregates
//! - [`processors`] - one processor per filing type
//! - [`registry`] - filing type to processor lookup
//! - [`state_machine`] - pipeline states and transitions
//! - [`orchestration`] - loader, orchestrator and failure classification
//! - [`events`] - follow-on event publishing
//! - [`execution`] - worker pool
//! - [`config`], [`logging`], [`metrics`], [`error`] - ambient concerns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filing_processor::config::FilerConfig;
//! use filing_processor::database::InMemoryStore;
//! use filing_processor::events::OutcomePublisher;
//! use filing_processor::messaging::{FilingEvent, InMemoryBroker};
//! use filing_processor::orchestration::FilingOrchestrator;
//! use filing_processor::registry::ProcessorRegistry;
//! use filing_processor::utils::SystemClock;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FilerConfig::default();
//! let broker = Arc::new(InMemoryBroker::new());
//! let orchestrator = FilingOrchestrator::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(ProcessorRegistry::from_config(&config.processors)?),
//!     Arc::new(OutcomePublisher::new(broker, &config.broker)),
//!     Arc::new(SystemClock),
//!     &config,
//! );
//!
//! let outcome = orchestrator.process(&FilingEvent::new(42)).await?;
//! println!("filing {} ended in {}", outcome.filing_id, outcome.final_state);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod processors;
pub mod registry;
pub mod state_machine;
pub mod utils;

pub use config::{ConfigManager, FilerConfig};
pub use database::{FilingStore, InMemoryStore, PgFilingStore, UnitOfWork};
pub use error::{FilerError, FilerResult};
pub use events::{FollowOnEvent, OutcomePublisher, PublishReport};
pub use execution::{FilingWorkerPool, MessageOutcome};
pub use messaging::{FilingEvent, InMemoryBroker, MessageBroker, PgmqBroker, QueueMessage};
pub use models::{Business, Filing, FilingStatus, FilingType};
pub use orchestration::{ErrorClassifier, FailureDisposition, FilingOrchestrator, ProcessingOutcome};
pub use processors::{FilingMeta, FilingProcessor, ProcessingContext};
pub use registry::ProcessorRegistry;
pub use state_machine::{PipelineEvent, PipelineState, PipelineStateMachine};
pub use utils::{Clock, FixedClock, SystemClock};
