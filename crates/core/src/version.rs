use std::fmt;

use serde::Serialize;

const UNKNOWN: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub repository_url: &'static str,
}

impl VersionInfo {
    /// Build metadata; `DECKHAND_GIT_COMMIT` is read at compile time.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            commit: non_empty(option_env!("DECKHAND_GIT_COMMIT").unwrap_or_default()),
            repository_url: non_empty(env!("CARGO_PKG_REPOSITORY")),
        }
    }
}

fn non_empty(value: &'static str) -> &'static str {
    if value.is_empty() {
        UNKNOWN
    } else {
        value
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Version {} (Commit: {})\nRepoUrl: {}",
            self.version, self.commit, self.repository_url
        )
    }
}
