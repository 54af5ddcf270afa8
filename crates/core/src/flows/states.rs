use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    ReleaseDialogue,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowState {
    AwaitingRepoSelection,
    AwaitingLevelSelection,
    AwaitingConfirmation,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl FlowState {
    pub const ALL: [FlowState; 7] = [
        Self::AwaitingRepoSelection,
        Self::AwaitingLevelSelection,
        Self::AwaitingConfirmation,
        Self::Executing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Stable identifier; cancel buttons carry it as their value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingRepoSelection => "awaiting_repo_selection",
            Self::AwaitingLevelSelection => "awaiting_level_selection",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == value)
            .ok_or_else(|| format!("unknown flow state `{value}`"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    RepoSelected,
    LevelSelected,
    Confirmed,
    ReleaseSucceeded,
    ReleaseFailed,
    InputRejected,
    CancelRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    /// Whether the repository decoded from the callback is still a configured target.
    pub target_configured: bool,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self { target_configured: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    RenderLevelSelection,
    RenderConfirmation,
    RenderProcessing,
    ExecuteRelease,
    RenderPullRequest,
    RenderFailure,
    RenderCancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
