//! # Filing Orchestrator
//!
//! Drives one filing event through the pipeline:
//!
//! ```text
//! Received ─▶ Loaded ─▶ Dispatched ─▶ Mutated ─▶ Persisted ─▶ Published
//!               │
//!               └─ COMPLETED filing ─────────────────────────▶ Published
//! ```
//!
//! Load, dispatch and mutate run inside one unit of work under the pipeline
//! budget. The commit itself is never cut short by the budget. Follow-on
//! events are published only after the commit succeeds, and a publish failure
//! leaves the committed filing in place.
//!
//! A failed run records the error on the filing in a separate unit of work so
//! operators can see it on the filing itself.

use super::loader::{FilingLoader, LoadedAggregate};
use crate::config::FilerConfig;
use crate::constants::events;
use crate::database::{FilingStore, UnitOfWork};
use crate::error::{FilerError, FilerResult};
use crate::events::{OutcomePublisher, PublishReport};
use crate::logging::log_filing_operation;
use crate::messaging::FilingEvent;
use crate::metrics;
use crate::models::{Business, Filing, FilingStatus, ProcessingError};
use crate::processors::{FilingMeta, FilingProcessor, ProcessingContext};
use crate::registry::ProcessorRegistry;
use crate::state_machine::{PipelineEvent, PipelineState, PipelineStateMachine, PipelineTransition};
use crate::utils::clock::Clock;
use opentelemetry::KeyValue;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of a pipeline run that did not fail
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub filing_id: i64,
    pub filing_type: String,
    /// Always `Published` for a successful run
    pub final_state: PipelineState,
    /// The filing was already COMPLETED; nothing was written or published
    pub short_circuited: bool,
    pub business_id: Option<i64>,
    pub business_identifier: Option<String>,
    pub publish_report: PublishReport,
    pub transitions: Vec<PipelineTransition>,
}

/// What the budgeted part of the pipeline produced
enum Staged {
    AlreadyCompleted(Filing),
    Mutated(Box<ProcessingContext>),
}

/// Committed filing and business, ready for publishing
struct Persisted {
    filing: Filing,
    business: Option<Business>,
    meta: FilingMeta,
}

#[derive(Debug, Clone)]
pub struct FilingOrchestrator {
    store: Arc<dyn FilingStore>,
    registry: Arc<ProcessorRegistry>,
    publisher: Arc<OutcomePublisher>,
    clock: Arc<dyn Clock>,
    loader: FilingLoader,
    pipeline_timeout: Duration,
}

impl FilingOrchestrator {
    pub fn new(
        store: Arc<dyn FilingStore>,
        registry: Arc<ProcessorRegistry>,
        publisher: Arc<OutcomePublisher>,
        clock: Arc<dyn Clock>,
        config: &FilerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            publisher,
            clock,
            loader: FilingLoader::new(config.processing.correction_chain_max_depth),
            pipeline_timeout: config.worker.pipeline_timeout(),
        }
    }

    pub fn with_pipeline_timeout(mut self, pipeline_timeout: Duration) -> Self {
        self.pipeline_timeout = pipeline_timeout;
        self
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Run the pipeline for one decoded event
    pub async fn process(&self, event: &FilingEvent) -> FilerResult<ProcessingOutcome> {
        let started = Instant::now();
        let mut machine = PipelineStateMachine::new(event.filing_id);

        debug!(
            filing_id = event.filing_id,
            correlation_id = %event.correlation_id,
            attempt = event.delivery_attempt,
            event_name = events::FILING_RECEIVED,
            "Processing filing event"
        );

        match self.run(event, &mut machine).await {
            Ok(outcome) => {
                let result = if outcome.short_circuited {
                    "short_circuited"
                } else {
                    "published"
                };
                metrics::pipeline_duration().record(
                    started.elapsed().as_secs_f64() * 1000.0,
                    &[
                        KeyValue::new("filing_type", outcome.filing_type.clone()),
                        KeyValue::new("result", result),
                    ],
                );
                Ok(outcome)
            }
            Err(error) => {
                if let Err(transition_error) =
                    machine.transition(PipelineEvent::fail_with(error.error_class()))
                {
                    debug!(error = %transition_error, "Pipeline already terminal");
                }

                let filing_type = self.record_failure(event, &error).await;
                let filing_type = filing_type.as_deref().unwrap_or("unknown");

                warn!(
                    filing_id = event.filing_id,
                    filing_type,
                    error_class = error.error_class(),
                    retryable = error.is_retryable(),
                    attempt = event.delivery_attempt,
                    error = %error,
                    event_name = events::FILING_FAILED,
                    "❌ Filing pipeline failed"
                );
                metrics::filings_failed().add(
                    1,
                    &metrics::failure_labels(filing_type, error.error_class(), error.is_retryable()),
                );
                metrics::pipeline_duration().record(
                    started.elapsed().as_secs_f64() * 1000.0,
                    &[
                        KeyValue::new("filing_type", filing_type.to_string()),
                        KeyValue::new("result", "failed"),
                    ],
                );
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        event: &FilingEvent,
        machine: &mut PipelineStateMachine,
    ) -> FilerResult<ProcessingOutcome> {
        let mut uow = self.store.begin(event.filing_id).await?;

        let staged = tokio::time::timeout(
            self.pipeline_timeout,
            self.stage(uow.as_mut(), event, machine),
        )
        .await;

        let staged = match staged {
            Ok(Ok(staged)) => staged,
            Ok(Err(error)) => {
                Self::discard(uow).await;
                return Err(error);
            }
            Err(_) => {
                Self::discard(uow).await;
                return Err(FilerError::PipelineTimeout {
                    filing_id: event.filing_id,
                    timeout: self.pipeline_timeout,
                });
            }
        };

        match staged {
            Staged::AlreadyCompleted(filing) => {
                Self::discard(uow).await;
                machine.transition(PipelineEvent::ShortCircuit)?;
                info!(
                    filing_id = filing.id,
                    filing_type = %filing.filing_type,
                    event_name = events::FILING_REPLAYED,
                    "🔁 Filing already completed, skipping"
                );
                Ok(ProcessingOutcome {
                    filing_id: filing.id,
                    filing_type: filing.filing_type,
                    final_state: machine.current_state(),
                    short_circuited: true,
                    business_id: filing.business_id,
                    business_identifier: event.business_identifier.clone(),
                    publish_report: PublishReport::default(),
                    transitions: machine.history().to_vec(),
                })
            }
            Staged::Mutated(ctx) => {
                let persisted = Self::persist(uow, *ctx).await?;
                machine.transition(PipelineEvent::Persist)?;

                let Persisted {
                    filing,
                    business,
                    meta,
                } = persisted;
                metrics::filings_completed()
                    .add(1, &[KeyValue::new("filing_type", filing.filing_type.clone())]);

                let publish_report = self
                    .publisher
                    .publish(&filing, business.as_ref(), &meta)
                    .await;
                machine.transition(PipelineEvent::Publish)?;

                log_filing_operation(
                    events::FILING_COMPLETED,
                    Some(filing.id),
                    Some(&filing.filing_type),
                    business.as_ref().map(|b| b.identifier.as_str()),
                    filing.status.as_str(),
                    Some(&format!(
                        "published {} follow-on events, {} failed",
                        publish_report.published.len(),
                        publish_report.failed.len()
                    )),
                );

                Ok(ProcessingOutcome {
                    filing_id: filing.id,
                    filing_type: filing.filing_type,
                    final_state: machine.current_state(),
                    short_circuited: false,
                    business_id: business.as_ref().map(|b| b.id),
                    business_identifier: business.map(|b| b.identifier),
                    publish_report,
                    transitions: machine.history().to_vec(),
                })
            }
        }
    }

    /// Load, dispatch and mutate; everything here runs under the pipeline budget
    async fn stage(
        &self,
        uow: &mut dyn UnitOfWork,
        event: &FilingEvent,
        machine: &mut PipelineStateMachine,
    ) -> FilerResult<Staged> {
        let LoadedAggregate {
            filing,
            business,
            related,
        } = self.loader.load(uow, event.filing_id).await?;
        machine.transition(PipelineEvent::Load)?;

        if filing.is_completed() {
            return Ok(Staged::AlreadyCompleted(filing));
        }

        if filing.status == FilingStatus::Withdrawn {
            return Err(FilerError::FilingWithdrawn {
                filing_id: filing.id,
            });
        }

        if !filing.status.is_processable() {
            return Err(FilerError::InvalidFilingState {
                filing_id: filing.id,
                status: filing.status.to_string(),
                reason: "only pending, paid or errored filings are applied".to_string(),
            });
        }

        if let (Some(expected), Some(business)) = (&event.business_identifier, &business) {
            if expected != &business.identifier {
                return Err(FilerError::BusinessIdentifierMismatch {
                    filing_id: filing.id,
                    expected: expected.clone(),
                    actual: business.identifier.clone(),
                });
            }
        }

        let processor = self.registry.resolve(&filing.filing_type)?;
        machine.transition(PipelineEvent::Dispatch)?;

        let mut ctx = ProcessingContext::new(filing, business, related, self.clock.now());
        Self::apply(processor.as_ref(), &mut ctx)?;
        machine.transition(PipelineEvent::Mutate)?;

        debug!(
            filing_id = ctx.filing.id,
            filing_type = %ctx.filing.filing_type,
            touched = ctx.touched.len(),
            "Filing applied to business aggregate"
        );
        Ok(Staged::Mutated(Box::new(ctx)))
    }

    /// Run the processor; a panic fails this event retryably instead of the worker
    fn apply(processor: &dyn FilingProcessor, ctx: &mut ProcessingContext) -> FilerResult<()> {
        match panic::catch_unwind(AssertUnwindSafe(|| processor.process(ctx))) {
            Ok(result) => result,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|message| (*message).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "processor panicked".to_string());
                error!(
                    filing_id = ctx.filing.id,
                    filing_type = %ctx.filing.filing_type,
                    reason = %reason,
                    "💥 Filing processor panicked"
                );
                Err(FilerError::Processing {
                    filing_type: ctx.filing.filing_type.clone(),
                    reason,
                })
            }
        }
    }

    /// Stage every write and commit; the business is saved first so a new
    /// business id can be linked to the filing
    async fn persist(mut uow: Box<dyn UnitOfWork>, ctx: ProcessingContext) -> FilerResult<Persisted> {
        let ProcessingContext {
            mut filing,
            mut business,
            related,
            touched,
            meta,
            now,
        } = ctx;

        let staged = async {
            if let Some(business) = business.as_mut() {
                business.last_modified = now;
                business.id = uow.save_business(business).await?;
                filing.business_id = Some(business.id);
            }

            filing
                .transition_status(FilingStatus::Completed)
                .map_err(|reason| FilerError::InvalidFilingState {
                    filing_id: filing.id,
                    status: filing.status.to_string(),
                    reason,
                })?;
            filing.completion_date = Some(now);
            filing.meta_data = Some(meta.to_value(&filing));
            filing.processing_error = None;
            filing.version = uow.save_filing(&filing).await?;

            for related in related.iter().filter(|f| touched.contains(&f.id)) {
                uow.save_filing(related).await?;
            }
            FilerResult::Ok(())
        }
        .await;

        if let Err(error) = staged {
            Self::discard(uow).await;
            return Err(error);
        }
        uow.commit().await?;

        Ok(Persisted {
            filing,
            business,
            meta,
        })
    }

    /// Record the failure on the filing, leaving its status as it was;
    /// returns the filing type when known
    async fn record_failure(&self, event: &FilingEvent, error: &FilerError) -> Option<String> {
        let mut uow = match self.store.begin(event.filing_id).await {
            Ok(uow) => uow,
            Err(store_error) => {
                warn!(filing_id = event.filing_id, error = %store_error, "Could not record filing failure");
                return None;
            }
        };

        let mut filing = match uow.find_filing(event.filing_id).await {
            Ok(Some(filing)) => filing,
            Ok(None) => {
                Self::discard(uow).await;
                return None;
            }
            Err(store_error) => {
                warn!(filing_id = event.filing_id, error = %store_error, "Could not record filing failure");
                Self::discard(uow).await;
                return None;
            }
        };
        let filing_type = filing.filing_type.clone();

        if filing.status.is_terminal() {
            Self::discard(uow).await;
            return Some(filing_type);
        }

        filing.processing_error = Some(ProcessingError {
            error_class: error.error_class().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            attempt: event.delivery_attempt,
            failed_at: self.clock.now(),
        });

        let saved = match uow.save_filing(&filing).await {
            Ok(_) => uow.commit().await,
            Err(save_error) => {
                Self::discard(uow).await;
                Err(save_error)
            }
        };
        if let Err(store_error) = saved {
            warn!(filing_id = filing.id, error = %store_error, "Could not record filing failure");
        }

        Some(filing_type)
    }

    async fn discard(uow: Box<dyn UnitOfWork>) {
        if let Err(error) = uow.rollback().await {
            warn!(error = %error, "Rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::messaging::InMemoryBroker;
    use crate::models::{FilingType, LegalType};
    use crate::utils::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct Harness {
        store: InMemoryStore,
        broker: Arc<InMemoryBroker>,
        orchestrator: FilingOrchestrator,
    }

    fn harness() -> Harness {
        harness_with(ProcessorRegistry::standard())
    }

    fn harness_with(registry: ProcessorRegistry) -> Harness {
        let store = InMemoryStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let config = FilerConfig::default();
        let publisher = Arc::new(OutcomePublisher::new(broker.clone(), &config.broker));
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        let orchestrator = FilingOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(registry),
            publisher,
            clock,
            &config,
        );
        Harness {
            store,
            broker,
            orchestrator,
        }
    }

    fn seed_business(store: &InMemoryStore) -> i64 {
        store.insert_business(Business::new(
            "BC0000010",
            LegalType::BC,
            "OLD NAME LTD.",
            Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    fn change_of_name(id: i64, business_id: i64) -> Filing {
        Filing::new(id, Some(business_id), "changeOfName", Utc::now())
            .with_payload(json!({"filing": {"changeOfName": {"legalName": "NEW NAME LTD."}}}))
    }

    #[tokio::test]
    async fn test_change_of_name_completes_and_publishes() {
        let h = harness();
        let business_id = seed_business(&h.store);
        h.store.insert_filing(change_of_name(1, business_id));

        let outcome = h.orchestrator.process(&FilingEvent::new(1)).await.unwrap();
        assert_eq!(outcome.final_state, PipelineState::Published);
        assert!(!outcome.short_circuited);
        assert_eq!(outcome.transitions.len(), 5);

        let filing = h.store.filing(1).unwrap();
        assert_eq!(filing.status, FilingStatus::Completed);
        assert_eq!(
            filing.completion_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(h.store.business(business_id).unwrap().legal_name, "NEW NAME LTD.");
        assert_eq!(outcome.publish_report.topics(), vec!["email", "credential-revocation"]);
        assert_eq!(h.broker.len("emailer"), 1);
    }

    #[tokio::test]
    async fn test_completed_filing_short_circuits() {
        let h = harness();
        let business_id = seed_business(&h.store);
        h.store.insert_filing(change_of_name(2, business_id));

        h.orchestrator.process(&FilingEvent::new(2)).await.unwrap();
        let version = h.store.filing(2).unwrap().version;

        let replay = h.orchestrator.process(&FilingEvent::new(2)).await.unwrap();
        assert!(replay.short_circuited);
        assert_eq!(replay.final_state, PipelineState::Published);
        assert_eq!(h.store.filing(2).unwrap().version, version);
        assert_eq!(h.broker.len("emailer"), 1);
    }

    #[tokio::test]
    async fn test_identifier_mismatch_is_rejected() {
        let h = harness();
        let business_id = seed_business(&h.store);
        h.store.insert_filing(change_of_name(3, business_id));

        let event = FilingEvent::new(3).with_business_identifier("BC9999999");
        let err = h.orchestrator.process(&event).await.unwrap_err();
        assert!(matches!(err, FilerError::BusinessIdentifierMismatch { .. }));
        assert_eq!(h.store.business(business_id).unwrap().legal_name, "OLD NAME LTD.");
    }

    #[tokio::test]
    async fn test_failure_is_recorded_on_filing() {
        let h = harness();
        let business_id = seed_business(&h.store);
        h.store.insert_filing(
            Filing::new(4, Some(business_id), "changeOfName", Utc::now())
                .with_payload(json!({"filing": {"changeOfName": {}}})),
        );

        let err = h.orchestrator.process(&FilingEvent::new(4)).await.unwrap_err();
        assert!(matches!(err, FilerError::PayloadValidation { .. }));

        let filing = h.store.filing(4).unwrap();
        assert_eq!(filing.status, FilingStatus::Paid);
        let recorded = filing.processing_error.unwrap();
        assert_eq!(recorded.error_class, "PayloadValidationError");
        assert!(!recorded.retryable);
        assert!(h.broker.is_empty("emailer"));
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_store_untouched() {
        let h = harness();
        let business_id = seed_business(&h.store);
        h.store.insert_filing(change_of_name(5, business_id));
        h.store.inject_commit_failure(FilerError::store("commit", "connection reset"));

        let err = h.orchestrator.process(&FilingEvent::new(5)).await.unwrap_err();
        assert!(err.is_retryable());
        let filing = h.store.filing(5).unwrap();
        assert_eq!(filing.status, FilingStatus::Paid);
        assert!(filing.processing_error.unwrap().retryable);
        assert_eq!(h.store.business(business_id).unwrap().legal_name, "OLD NAME LTD.");

        let outcome = h.orchestrator.process(&FilingEvent::new(5).with_attempt(2)).await.unwrap();
        assert_eq!(outcome.final_state, PipelineState::Published);
        assert!(h.store.filing(5).unwrap().processing_error.is_none());
    }

    #[tokio::test]
    async fn test_slow_load_times_out() {
        let h = harness();
        let business_id = seed_business(&h.store);
        h.store.insert_filing(change_of_name(6, business_id));
        h.store.set_read_latency(Some(Duration::from_millis(200)));

        let orchestrator = h.orchestrator.clone().with_pipeline_timeout(Duration::from_millis(20));
        let err = orchestrator.process(&FilingEvent::new(6)).await.unwrap_err();
        assert!(matches!(err, FilerError::PipelineTimeout { filing_id: 6, .. }));
        assert!(err.is_retryable());
    }

    #[derive(Debug)]
    struct PanickingProcessor;

    impl FilingProcessor for PanickingProcessor {
        fn filing_type(&self) -> FilingType {
            FilingType::AnnualReport
        }

        fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
            if let Some(business) = ctx.business.as_mut() {
                business.legal_name = "HALF WRITTEN LTD.".to_string();
            }
            panic!("annual report index out of bounds");
        }
    }

    #[tokio::test]
    async fn test_processor_panic_fails_event_retryably() {
        let mut registry = ProcessorRegistry::standard();
        registry.register(Arc::new(PanickingProcessor));
        let h = harness_with(registry);
        let business_id = seed_business(&h.store);
        h.store.insert_filing(
            Filing::new(7, Some(business_id), "annualReport", Utc::now())
                .with_payload(json!({"filing": {"annualReport": {"annualReportDate": "2024-04-30"}}})),
        );

        let err = h.orchestrator.process(&FilingEvent::new(7)).await.unwrap_err();
        assert_eq!(
            err,
            FilerError::Processing {
                filing_type: "annualReport".to_string(),
                reason: "annual report index out of bounds".to_string(),
            }
        );
        assert!(err.is_retryable());

        let filing = h.store.filing(7).unwrap();
        assert_eq!(filing.status, FilingStatus::Paid);
        assert_eq!(filing.processing_error.unwrap().error_class, "ProcessingError");
        let business = h.store.business(business_id).unwrap();
        assert_eq!(business.legal_name, "OLD NAME LTD.");
        assert!(h.broker.is_empty("emailer"));

        // the orchestrator keeps serving other filings
        h.store.insert_filing(change_of_name(8, business_id));
        h.orchestrator.process(&FilingEvent::new(8)).await.unwrap();
        assert_eq!(h.store.business(business_id).unwrap().legal_name, "NEW NAME LTD.");
    }

    #[tokio::test]
    async fn test_withdrawn_filing_fails_as_withdrawn() {
        let h = harness();
        let business_id = seed_business(&h.store);
        let mut filing = change_of_name(9, business_id);
        filing.status = FilingStatus::Withdrawn;
        h.store.insert_filing(filing);

        let err = h.orchestrator.process(&FilingEvent::new(9)).await.unwrap_err();
        assert_eq!(err, FilerError::FilingWithdrawn { filing_id: 9 });
        assert!(!err.is_retryable());
        assert_eq!(h.store.filing(9).unwrap().status, FilingStatus::Withdrawn);
    }
}
