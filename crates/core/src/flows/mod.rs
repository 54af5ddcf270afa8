pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, ReleaseDialogueFlow};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome};
