pub mod broadcast;
pub mod common;
pub mod release;

pub use release::ReleaseDialogue;
