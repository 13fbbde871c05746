use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage reached by a filing event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Event decoded, nothing loaded yet
    Received,
    /// Filing and business loaded inside the unit of work
    Loaded,
    /// Processor resolved for the filing type
    Dispatched,
    /// Processor applied its mutation to the in-memory aggregate
    Mutated,
    /// Unit of work committed
    Persisted,
    /// Follow-on events handed to the publisher
    Published,
    /// Pipeline stopped with an error
    Failed,
}

impl PipelineState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }

    /// Whether store writes from this run are durable
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted | Self::Published)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Loaded => write!(f, "loaded"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Mutated => write!(f, "mutated"),
            Self::Persisted => write!(f, "persisted"),
            Self::Published => write!(f, "published"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for PipelineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "loaded" => Ok(Self::Loaded),
            "dispatched" => Ok(Self::Dispatched),
            "mutated" => Ok(Self::Mutated),
            "persisted" => Ok(Self::Persisted),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid pipeline state: {s}")),
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Received
    }
}
