//! Shared harness for integration tests: in-memory store and broker, a fixed
//! clock and a configuration with fast retries.

#![allow(dead_code)] // Not every test binary uses every helper

pub mod builders;
pub mod strategies;

pub use builders::*;

use chrono::{DateTime, TimeZone, Utc};
use filing_processor::config::FilerConfig;
use filing_processor::database::InMemoryStore;
use filing_processor::events::OutcomePublisher;
use filing_processor::execution::FilingWorkerPool;
use filing_processor::messaging::{FilingEvent, InMemoryBroker, MessageBroker};
use filing_processor::orchestration::FilingOrchestrator;
use filing_processor::registry::ProcessorRegistry;
use filing_processor::utils::FixedClock;
use std::sync::Arc;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 17, 0, 0).unwrap()
}

/// Defaults with millisecond backoff so retry paths finish quickly
pub fn test_config() -> FilerConfig {
    let mut config = FilerConfig::default();
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    config.broker.poll_interval_ms = 5;
    config.broker.visibility_timeout_seconds = 30;
    config.worker.pipeline_timeout_seconds = 5;
    config
}

pub struct TestHarness {
    pub config: FilerConfig,
    pub store: InMemoryStore,
    pub broker: Arc<InMemoryBroker>,
    pub clock: Arc<FixedClock>,
    pub orchestrator: Arc<FilingOrchestrator>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: FilerConfig) -> Self {
        let store = InMemoryStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let registry = ProcessorRegistry::from_config(&config.processors)
            .expect("test configuration names known filing types");
        let publisher = Arc::new(OutcomePublisher::new(broker.clone(), &config.broker));
        let orchestrator = Arc::new(FilingOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(registry),
            publisher,
            clock.clone(),
            &config,
        ));

        Self {
            config,
            store,
            broker,
            clock,
            orchestrator,
        }
    }

    pub fn worker_pool(&self) -> Arc<FilingWorkerPool> {
        Arc::new(FilingWorkerPool::new(
            self.broker.clone(),
            self.orchestrator.clone(),
            &self.config,
        ))
    }

    /// Put a plain filing envelope on the inbound queue
    pub async fn enqueue(&self, filing_id: i64) -> i64 {
        let body = FilingEvent::to_message_body(filing_id, None);
        self.broker
            .send(&self.config.broker.filing_queue, &body)
            .await
            .expect("in-memory send")
    }

    pub fn filing_queue_len(&self) -> usize {
        self.broker.len(&self.config.broker.filing_queue)
    }

    pub fn dead_letters(&self) -> Vec<serde_json::Value> {
        self.broker.messages(&self.config.broker.dead_letter_queue)
    }

    pub fn emails(&self) -> Vec<serde_json::Value> {
        self.broker.messages(&self.config.broker.email_queue)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
