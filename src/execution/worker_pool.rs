//! # Filing Worker Pool
//!
//! N consumers reading the inbound filing queue. Each consumer handles one
//! message at a time: decode, orchestrate, then settle the message with the
//! broker according to the outcome.
//!
//! | Outcome                          | Broker action            |
//! |----------------------------------|--------------------------|
//! | published or already completed   | ack                      |
//! | retryable, attempts remaining    | nack with backoff delay  |
//! | non-retryable, exhausted, malformed | dead-letter           |
//! | withdrawn filing                 | ack (dropped)            |
//!
//! Shutdown is signalled through a watch channel and is only observed while a
//! consumer is waiting on the broker, so an event already being processed
//! always runs to completion.

use crate::config::FilerConfig;
use crate::constants::events;
use crate::error::{FilerError, FilerResult};
use crate::messaging::{FilingEvent, MessageBroker, QueueMessage};
use crate::metrics;
use crate::orchestration::{ErrorClassifier, FailureDisposition, FilingOrchestrator};
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a single message was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Completed { filing_id: i64 },
    ShortCircuited { filing_id: i64 },
    Retried { filing_id: i64, delay: Duration },
    DeadLettered { error_class: String },
    Dropped { filing_id: i64 },
}

/// Running totals across all consumers
#[derive(Debug, Default)]
pub struct WorkerPoolStats {
    received: AtomicU64,
    completed: AtomicU64,
    short_circuited: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    dropped: AtomicU64,
    broker_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerPoolStatsSnapshot {
    pub received: u64,
    pub completed: u64,
    pub short_circuited: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
    pub broker_errors: u64,
}

impl WorkerPoolStats {
    fn record(&self, outcome: &MessageOutcome) {
        let counter = match outcome {
            MessageOutcome::Completed { .. } => &self.completed,
            MessageOutcome::ShortCircuited { .. } => &self.short_circuited,
            MessageOutcome::Retried { .. } => &self.retried,
            MessageOutcome::DeadLettered { .. } => &self.dead_lettered,
            MessageOutcome::Dropped { .. } => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerPoolStatsSnapshot {
        WorkerPoolStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            short_circuited: self.short_circuited.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            broker_errors: self.broker_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct FilingWorkerPool {
    broker: Arc<dyn MessageBroker>,
    orchestrator: Arc<FilingOrchestrator>,
    classifier: ErrorClassifier,
    filing_queue: String,
    dead_letter_queue: String,
    visibility_timeout: Duration,
    poll_interval: Duration,
    stats: Arc<WorkerPoolStats>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FilingWorkerPool {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        orchestrator: Arc<FilingOrchestrator>,
        config: &FilerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            broker,
            orchestrator,
            classifier: ErrorClassifier::new(&config.retry),
            filing_queue: config.broker.filing_queue.clone(),
            dead_letter_queue: config.broker.dead_letter_queue.clone(),
            visibility_timeout: config.broker.visibility_timeout(),
            poll_interval: config.broker.poll_interval(),
            stats: Arc::new(WorkerPoolStats::default()),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn stats(&self) -> WorkerPoolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of consumers currently running
    pub fn active_workers(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Spawn `workers` consumers
    pub async fn start(self: &Arc<Self>, workers: usize) -> FilerResult<()> {
        if workers == 0 {
            return Err(FilerError::Configuration(
                "worker pool needs at least one consumer".to_string(),
            ));
        }

        self.broker.ensure_queue(&self.filing_queue).await?;
        self.broker.ensure_queue(&self.dead_letter_queue).await?;
        self.shutdown_tx.send_replace(false);

        let mut handles = self.handles.lock();
        for worker_id in 0..workers {
            let pool = Arc::clone(self);
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                pool.consume(worker_id, shutdown_rx).await;
            }));
        }

        info!(
            workers,
            queue = %self.filing_queue,
            max_attempts = self.classifier.max_attempts(),
            "🚀 Filing worker pool started"
        );
        Ok(())
    }

    /// Signal shutdown and wait up to `timeout` for consumers to finish
    ///
    /// Returns `false` when some consumer was still busy at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        let count = handles.len();

        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(results) => {
                for result in results.into_iter().filter_map(Result::err) {
                    warn!(error = %result, "Worker task ended abnormally");
                }
                info!(workers = count, stats = ?self.stats(), "🛑 Filing worker pool stopped");
                true
            }
            Err(_) => {
                warn!(workers = count, timeout = ?timeout, "Workers did not stop in time");
                false
            }
        }
    }

    async fn consume(&self, worker_id: usize, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(worker_id, "Worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let read = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                read = self.broker.read(&self.filing_queue, self.visibility_timeout) => read,
            };

            let idle = match read {
                Ok(Some(message)) => {
                    self.handle_message(message).await;
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    self.stats.broker_errors.fetch_add(1, Ordering::Relaxed);
                    error!(worker_id, queue = %self.filing_queue, error = %e, "Queue read failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {},
                    _ = shutdown_rx.changed() => break,
                }
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    /// Read and settle at most one message; `None` when the queue is empty
    pub async fn poll_once(&self) -> FilerResult<Option<MessageOutcome>> {
        let message = self
            .broker
            .read(&self.filing_queue, self.visibility_timeout)
            .await?;
        match message {
            Some(message) => Ok(Some(self.handle_message(message).await)),
            None => Ok(None),
        }
    }

    /// Decode, orchestrate and settle one message
    pub async fn handle_message(&self, message: QueueMessage) -> MessageOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        metrics::events_received().add(1, &[KeyValue::new("queue", self.filing_queue.clone())]);

        let outcome = match FilingEvent::decode(&message) {
            Ok(event) => self.orchestrate(&message, &event).await,
            Err(error) => {
                warn!(msg_id = message.msg_id, error = %error, "Malformed filing event");
                self.dead_letter(&message, &error).await
            }
        };

        self.stats.record(&outcome);
        outcome
    }

    async fn orchestrate(&self, message: &QueueMessage, event: &FilingEvent) -> MessageOutcome {
        let error = match self.orchestrator.process(event).await {
            Ok(outcome) => {
                self.ack(message).await;
                return if outcome.short_circuited {
                    MessageOutcome::ShortCircuited {
                        filing_id: outcome.filing_id,
                    }
                } else {
                    MessageOutcome::Completed {
                        filing_id: outcome.filing_id,
                    }
                };
            }
            Err(error) => error,
        };

        match self.classifier.classify(&error, event.delivery_attempt) {
            FailureDisposition::Retry { delay } => {
                info!(
                    filing_id = event.filing_id,
                    attempt = event.delivery_attempt,
                    delay_ms = delay.as_millis() as u64,
                    error_class = error.error_class(),
                    event_name = events::FILING_RETRY_SCHEDULED,
                    "🔄 Filing scheduled for retry"
                );
                if let Err(e) = self
                    .broker
                    .nack(&self.filing_queue, message.msg_id, delay)
                    .await
                {
                    self.broker_failure("nack", message, &e.into());
                }
                MessageOutcome::Retried {
                    filing_id: event.filing_id,
                    delay,
                }
            }
            FailureDisposition::DeadLetter => self.dead_letter(message, &error).await,
            FailureDisposition::Drop => {
                info!(
                    filing_id = event.filing_id,
                    error_class = error.error_class(),
                    "Dropping obsolete filing event"
                );
                self.ack(message).await;
                MessageOutcome::Dropped {
                    filing_id: event.filing_id,
                }
            }
        }
    }

    async fn dead_letter(&self, message: &QueueMessage, error: &FilerError) -> MessageOutcome {
        let reason = format!("{}: {}", error.error_class(), error);
        if let Err(e) = self
            .broker
            .dead_letter(&self.filing_queue, message, &self.dead_letter_queue, &reason)
            .await
        {
            self.broker_failure("dead_letter", message, &e.into());
        }

        error!(
            msg_id = message.msg_id,
            read_ct = message.read_ct,
            error_class = error.error_class(),
            error = %error,
            event_name = events::FILING_DEAD_LETTERED,
            "☠️ Filing event dead-lettered"
        );
        metrics::events_dead_lettered()
            .add(1, &[KeyValue::new("error_class", error.error_class())]);

        MessageOutcome::DeadLettered {
            error_class: error.error_class().to_string(),
        }
    }

    async fn ack(&self, message: &QueueMessage) {
        if let Err(e) = self.broker.ack(&self.filing_queue, message.msg_id).await {
            self.broker_failure("ack", message, &e.into());
        }
    }

    /// The message reappears after its visibility timeout
    fn broker_failure(&self, operation: &str, message: &QueueMessage, error: &FilerError) {
        self.stats.broker_errors.fetch_add(1, Ordering::Relaxed);
        error!(
            operation,
            msg_id = message.msg_id,
            queue = %self.filing_queue,
            error = %error,
            "Broker operation failed"
        );
    }
}
