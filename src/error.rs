//! # Filing Processor Errors
//!
//! Error taxonomy for the filing pipeline. Every failure that crosses the
//! orchestrator boundary is a [`FilerError`]; its [`FilerError::is_retryable`]
//! flag decides whether the broker redelivers the event or the event is
//! dead-lettered for manual remediation.

use crate::messaging::MessagingError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while decoding, loading, processing, persisting or publishing a filing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilerError {
    /// Queue message could not be decoded into a filing event
    #[error("Malformed filing event: {reason}")]
    MalformedEvent { reason: String },

    /// No filing exists for the event's filing id
    #[error("Filing {filing_id} not found")]
    FilingNotFound { filing_id: i64 },

    /// The filing references a business that does not exist
    #[error("Business {business_id:?} for filing {filing_id} not found")]
    BusinessNotFound {
        filing_id: i64,
        business_id: Option<i64>,
    },

    /// The filing type has no registered processor
    #[error("Unknown filing type: {filing_type}")]
    UnknownFilingType { filing_type: String },

    /// The filing type is known but its processor is switched off by feature flag
    #[error("Processor for filing type {filing_type} is disabled")]
    ProcessorDisabled { filing_type: String },

    /// The filing payload passed schema validation but violates a semantic rule
    #[error("Invalid {filing_type} payload at {field}: {reason}")]
    PayloadValidation {
        filing_type: String,
        field: String,
        reason: String,
    },

    /// A voluntary dissolution without a dissolution date
    #[error("Dissolution date missing for voluntary dissolution filing {filing_id}")]
    DissolutionDateMissing { filing_id: i64 },

    /// The filing is in a status the pipeline cannot process
    #[error("Filing {filing_id} in status {status} cannot be processed: {reason}")]
    InvalidFilingState {
        filing_id: i64,
        status: String,
        reason: String,
    },

    /// The event's own filing was withdrawn after the event was queued
    #[error("Filing {filing_id} was withdrawn")]
    FilingWithdrawn { filing_id: i64 },

    /// The event's business identifier does not match the stored business
    #[error("Business identifier mismatch for filing {filing_id}: event {expected}, store {actual}")]
    BusinessIdentifierMismatch {
        filing_id: i64,
        expected: String,
        actual: String,
    },

    /// The correction ancestor chain is cyclic, too deep, or broken
    #[error("Correction chain for filing {filing_id} is invalid: {reason}")]
    CorrectionChainInvalid { filing_id: i64, reason: String },

    /// Pipeline state machine received an event it cannot apply
    #[error("Invalid pipeline transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Stored data could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transient store failure (connection loss, deadlock, statement timeout)
    #[error("Store error during {operation}: {reason}")]
    TransientStore { operation: String, reason: String },

    /// A concurrent writer changed the row since it was read
    #[error("Optimistic lock conflict on {entity} {id}")]
    OptimisticLock { entity: String, id: i64 },

    /// Load and dispatch exceeded the pipeline budget
    #[error("Pipeline for filing {filing_id} exceeded {timeout:?}")]
    PipelineTimeout { filing_id: i64, timeout: Duration },

    /// Unexpected processor failure
    #[error("Processing {filing_type} failed: {reason}")]
    Processing { filing_type: String, reason: String },

    /// Follow-on event could not be published
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Broker failure
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FilerError {
    /// Whether redelivering the same event may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientStore { .. }
                | Self::OptimisticLock { .. }
                | Self::PipelineTimeout { .. }
                | Self::Processing { .. }
                | Self::Messaging(_)
        )
    }

    /// Stable error class name used in logs, metrics and recorded failures
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::MalformedEvent { .. } => "MalformedEventError",
            Self::FilingNotFound { .. } => "FilingNotFoundError",
            Self::BusinessNotFound { .. } => "BusinessNotFoundError",
            Self::UnknownFilingType { .. } => "UnknownFilingTypeError",
            Self::ProcessorDisabled { .. } => "ProcessorDisabledError",
            Self::PayloadValidation { .. } => "PayloadValidationError",
            Self::DissolutionDateMissing { .. } => "DissolutionDateMissingError",
            Self::InvalidFilingState { .. } => "InvalidFilingStateError",
            Self::FilingWithdrawn { .. } => "FilingWithdrawnError",
            Self::BusinessIdentifierMismatch { .. } => "BusinessIdentifierMismatchError",
            Self::CorrectionChainInvalid { .. } => "CorrectionChainInvalidError",
            Self::InvalidTransition { .. } => "InvalidTransitionError",
            Self::Serialization(_) => "SerializationError",
            Self::TransientStore { .. } => "TransientStoreError",
            Self::OptimisticLock { .. } => "OptimisticLockError",
            Self::PipelineTimeout { .. } => "PipelineTimeoutError",
            Self::Processing { .. } => "ProcessingError",
            Self::Publish { .. } => "PublishError",
            Self::Messaging(_) => "MessagingError",
            Self::Configuration(_) => "ConfigurationError",
        }
    }

    /// Create a payload validation error
    pub fn payload(
        filing_type: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PayloadValidation {
            filing_type: filing_type.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a transient store error
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientStore {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for FilerError {
    fn from(error: serde_json::Error) -> Self {
        FilerError::Serialization(error.to_string())
    }
}

impl From<sqlx::Error> for FilerError {
    fn from(err: sqlx::Error) -> Self {
        // 40001 serialization_failure, 40P01 deadlock_detected
        let conflict = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == "40001" || code == "40P01");

        if conflict {
            FilerError::OptimisticLock {
                entity: "row".to_string(),
                id: 0,
            }
        } else {
            FilerError::store("database", err.to_string())
        }
    }
}

impl From<MessagingError> for FilerError {
    fn from(error: MessagingError) -> Self {
        FilerError::Messaging(error.to_string())
    }
}

pub type FilerResult<T> = std::result::Result<T, FilerError>;
