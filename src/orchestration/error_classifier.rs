//! # Failure Classification
//!
//! Decides what the worker does with an event whose pipeline run failed:
//! redeliver it later, move it to the dead-letter queue, or drop it.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌────────────────────┐
//! │ FilerError      │────▶│ ErrorClassifier │────▶│ FailureDisposition │
//! │ + attempt       │     │ (RetryConfig)   │     │ Retry / DLQ / Drop │
//! └─────────────────┘     └─────────────────┘     └────────────────────┘
//! ```
//!
//! Retry delays grow as `base_delay * multiplier^(attempt - 1)`, capped at
//! `max_delay`.

use crate::config::RetryConfig;
use crate::error::FilerError;
use serde::Serialize;
use std::time::Duration;

/// What to do with a failed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum FailureDisposition {
    /// Make the message visible again after `delay`
    Retry { delay: Duration },
    /// Move the message to the dead-letter queue
    DeadLetter,
    /// Acknowledge and discard; the event is obsolete
    Drop,
}

impl FailureDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry { .. } => "retry",
            Self::DeadLetter => "dead_letter",
            Self::Drop => "drop",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl ErrorClassifier {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classify `error` raised on delivery `attempt` (1-based)
    pub fn classify(&self, error: &FilerError, attempt: u32) -> FailureDisposition {
        if Self::is_obsolete(error) {
            return FailureDisposition::Drop;
        }

        if !error.is_retryable() || attempt >= self.max_attempts {
            return FailureDisposition::DeadLetter;
        }

        FailureDisposition::Retry {
            delay: self.backoff_delay(attempt),
        }
    }

    /// Delay before redelivering after failed delivery `attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let delay_ms = self.base_delay.as_millis() as f64 * factor;
        let max_ms = self.max_delay.as_millis() as f64;

        if !delay_ms.is_finite() || delay_ms >= max_ms {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms as u64)
    }

    /// Redelivery of a filing that has since been withdrawn. Other filings
    /// found withdrawn (a notice's target, say) are ordinary failures.
    fn is_obsolete(error: &FilerError) -> bool {
        matches!(error, FilerError::FilingWithdrawn { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::new(&RetryConfig {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        })
    }

    fn lock_conflict() -> FilerError {
        FilerError::OptimisticLock {
            entity: "business".to_string(),
            id: 1,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let classifier = classifier();
        assert_eq!(classifier.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(classifier.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(classifier.backoff_delay(4), Duration::from_millis(800));
        assert_eq!(classifier.backoff_delay(5), Duration::from_millis(1_000));
        assert_eq!(classifier.backoff_delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_retryable_errors_retry_until_exhausted() {
        let classifier = classifier();
        assert_eq!(
            classifier.classify(&lock_conflict(), 1),
            FailureDisposition::Retry {
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            classifier.classify(&lock_conflict(), 3),
            FailureDisposition::Retry {
                delay: Duration::from_millis(400)
            }
        );
        assert_eq!(
            classifier.classify(&lock_conflict(), 4),
            FailureDisposition::DeadLetter
        );
    }

    #[test]
    fn test_permanent_errors_dead_letter_immediately() {
        let classifier = classifier();
        for error in [
            FilerError::UnknownFilingType {
                filing_type: "bogus".to_string(),
            },
            FilerError::FilingNotFound { filing_id: 1 },
            FilerError::payload("changeOfName", "legalName", "missing"),
            FilerError::MalformedEvent {
                reason: "bad".to_string(),
            },
        ] {
            assert_eq!(classifier.classify(&error, 1), FailureDisposition::DeadLetter);
        }
    }

    #[test]
    fn test_withdrawn_filings_are_dropped() {
        let error = FilerError::FilingWithdrawn { filing_id: 3 };
        assert_eq!(classifier().classify(&error, 1), FailureDisposition::Drop);

        // a withdrawn target of another filing is a permanent failure
        let target = FilerError::InvalidFilingState {
            filing_id: 2,
            status: "WITHDRAWN".to_string(),
            reason: "cannot transition from WITHDRAWN to WITHDRAWN".to_string(),
        };
        assert_eq!(classifier().classify(&target, 1), FailureDisposition::DeadLetter);

        let draft = FilerError::InvalidFilingState {
            filing_id: 3,
            status: "DRAFT".to_string(),
            reason: "not submitted".to_string(),
        };
        assert_eq!(classifier().classify(&draft, 1), FailureDisposition::DeadLetter);
    }
}
