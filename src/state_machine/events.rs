use serde::{Deserialize, Serialize};

/// Events that move a filing event through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    /// Filing aggregate loaded
    Load,
    /// Processor resolved
    Dispatch,
    /// Processor applied the filing
    Mutate,
    /// Unit of work committed
    Persist,
    /// Follow-on events published
    Publish,
    /// Filing was already completed; skip straight to published
    ShortCircuit,
    /// Pipeline failed with an error class
    Fail(String),
}

impl PipelineEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Dispatch => "dispatch",
            Self::Mutate => "mutate",
            Self::Persist => "persist",
            Self::Publish => "publish",
            Self::ShortCircuit => "short_circuit",
            Self::Fail(_) => "fail",
        }
    }

    /// Extract the error class if this is a failure event
    pub fn error_class(&self) -> Option<&str> {
        match self {
            Self::Fail(class) => Some(class),
            _ => None,
        }
    }

    pub fn fail_with(error_class: impl Into<String>) -> Self {
        Self::Fail(error_class.into())
    }
}
