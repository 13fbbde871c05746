//! # Pipeline State Machine
//!
//! Tracks one filing event through the processing pipeline:
//!
//! ```text
//! Received -> Loaded -> Dispatched -> Mutated -> Persisted -> Published
//!     \          \           \            \           \
//!      +----------+-----------+------------+-----------+--> Failed
//! ```
//!
//! An already-completed filing short-circuits from `Loaded` straight to
//! `Published` without mutating or republishing anything.

pub mod events;
pub mod pipeline_state_machine;
pub mod states;

pub use events::PipelineEvent;
pub use pipeline_state_machine::{PipelineStateMachine, PipelineTransition};
pub use states::PipelineState;
