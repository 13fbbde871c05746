use super::{events::PipelineEvent, states::PipelineState};
use crate::error::{FilerError, FilerResult};
use tracing::debug;

/// One applied transition
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub event: PipelineEvent,
}

/// In-memory state machine for a single pipeline run
///
/// Transitions are not persisted; the filing row itself records the durable
/// outcome. The history is kept for logging and assertions.
#[derive(Debug, Clone)]
pub struct PipelineStateMachine {
    filing_id: i64,
    state: PipelineState,
    history: Vec<PipelineTransition>,
}

impl PipelineStateMachine {
    pub fn new(filing_id: i64) -> Self {
        Self {
            filing_id,
            state: PipelineState::default(),
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> PipelineState {
        self.state
    }

    pub fn history(&self) -> &[PipelineTransition] {
        &self.history
    }

    pub fn filing_id(&self) -> i64 {
        self.filing_id
    }

    /// Attempt to apply `event`, returning the new state
    pub fn transition(&mut self, event: PipelineEvent) -> FilerResult<PipelineState> {
        let target = Self::determine_target_state(self.state, &event)?;
        debug!(
            filing_id = self.filing_id,
            from = %self.state,
            to = %target,
            event = event.event_type(),
            "Pipeline transition"
        );
        self.history.push(PipelineTransition {
            from: self.state,
            to: target,
            event,
        });
        self.state = target;
        Ok(target)
    }

    /// Determine the target state based on current state and event
    fn determine_target_state(
        current: PipelineState,
        event: &PipelineEvent,
    ) -> FilerResult<PipelineState> {
        use PipelineState::*;

        let target = match (current, event) {
            (Received, PipelineEvent::Load) => Loaded,
            (Loaded, PipelineEvent::Dispatch) => Dispatched,
            (Loaded, PipelineEvent::ShortCircuit) => Published,
            (Dispatched, PipelineEvent::Mutate) => Mutated,
            (Mutated, PipelineEvent::Persist) => Persisted,
            (Persisted, PipelineEvent::Publish) => Published,

            // failures are accepted from any non-terminal state
            (from, PipelineEvent::Fail(_)) if !from.is_terminal() => Failed,

            (from, _) => {
                return Err(FilerError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
