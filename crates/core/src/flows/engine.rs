use thiserror::Error;
use tracing::{debug, warn};

use crate::flows::states::{
    FlowAction, FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct ReleaseDialogueFlow;

impl FlowDefinition for ReleaseDialogueFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::ReleaseDialogue
    }

    fn initial_state(&self) -> FlowState {
        FlowState::AwaitingRepoSelection
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_release_dialogue(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_traced(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        correlation_id: &str,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => debug!(
                event_name = "flow.transition_applied",
                correlation_id,
                from = %outcome.from,
                to = %outcome.to,
                event = ?outcome.event,
                "dialogue transition applied"
            ),
            Err(error) => warn!(
                event_name = "flow.transition_rejected",
                correlation_id,
                error = %error,
                "dialogue transition rejected"
            ),
        }
        result
    }

    /// Applies an event whose outcome is only recorded, never rendered. Returns the
    /// state reached, or `current` when the event is rejected (which is logged).
    pub fn record(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        correlation_id: &str,
    ) -> FlowState {
        match self.apply_traced(current, event, context, correlation_id) {
            Ok(outcome) => outcome.to,
            Err(_) => current.clone(),
        }
    }
}

impl Default for FlowEngine<ReleaseDialogueFlow> {
    fn default() -> Self {
        Self::new(ReleaseDialogueFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("repository is not a configured release target in state {state:?}")]
    UnknownTarget { state: FlowState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn transition_release_dialogue(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ExecuteRelease, RenderCancelled, RenderConfirmation, RenderFailure, RenderLevelSelection,
        RenderProcessing, RenderPullRequest,
    };
    use FlowEvent::{
        CancelRequested, Confirmed, InputRejected, LevelSelected, ReleaseFailed, ReleaseSucceeded,
        RepoSelected,
    };
    use FlowState::{
        AwaitingConfirmation, AwaitingLevelSelection, AwaitingRepoSelection, Cancelled, Completed,
        Executing, Failed,
    };

    let (to, actions) = match (current, event) {
        (AwaitingRepoSelection, RepoSelected)
        | (AwaitingLevelSelection, LevelSelected)
        | (AwaitingConfirmation, Confirmed)
            if !context.target_configured =>
        {
            return Err(FlowTransitionError::UnknownTarget { state: current.clone() });
        }
        (AwaitingRepoSelection, RepoSelected) => {
            (AwaitingLevelSelection, vec![RenderLevelSelection])
        }
        (AwaitingLevelSelection, LevelSelected) => (AwaitingConfirmation, vec![RenderConfirmation]),
        (AwaitingConfirmation, Confirmed) => (Executing, vec![RenderProcessing, ExecuteRelease]),
        (Executing, ReleaseSucceeded) => (Completed, vec![RenderPullRequest]),
        (Executing, ReleaseFailed) => (Failed, vec![RenderFailure]),
        (AwaitingRepoSelection, InputRejected)
        | (AwaitingLevelSelection, InputRejected)
        | (AwaitingConfirmation, InputRejected) => (Failed, vec![RenderFailure]),
        (AwaitingRepoSelection, CancelRequested)
        | (AwaitingLevelSelection, CancelRequested)
        | (AwaitingConfirmation, CancelRequested)
        | (Cancelled, CancelRequested) => (Cancelled, vec![RenderCancelled]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}
