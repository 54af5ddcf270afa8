pub mod broadcast;
pub mod callback;
pub mod config;
pub mod errors;
pub mod flows;
pub mod release;
pub mod version;

pub use broadcast::{BroadcastClient, BroadcastError, Track};
pub use callback::{CallbackDecodeError, CallbackToken, TokenShape};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, FlowEvent, FlowState, ReleaseDialogueFlow};
pub use release::{
    OrgRepo, OrgRepoLevel, ReleaseError, ReleaseLevel, ReleaseRequest, ReleaseTarget,
    ReleaseTargets, ReleaseWorkflow,
};
pub use version::VersionInfo;
