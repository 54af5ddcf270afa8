//! Callback token codec.
//!
//! Slack sends the `value` of a clicked button or selected option back verbatim, so
//! every step of a dialogue carries its decisions so far inside that value. Nothing
//! is stored server-side.
//!
//! Wire format: fields joined by [`DELIMITER`], e.g. `acme__widget__release/patch`.
//! The shape a handler expects is fixed by the action id it is bound to; action ids
//! carry the schema version (`*.v1`), so a shape change ships under a new action id.

use thiserror::Error;

use crate::release::{NameError, OrgRepo, OrgRepoLevel, ReleaseLevel};

pub const DELIMITER: &str = "__";

const LOGGED_TOKEN_LIMIT: usize = 64;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallbackDecodeError {
    #[error("malformed callback token: expected {expected} fields, found {found}")]
    MalformedToken { expected: usize, found: usize },
    #[error("invalid callback field: {0}")]
    InvalidField(#[from] NameError),
    #[error("callback track id `{0}` is not an integer")]
    InvalidTrackId(String),
}

pub fn encode_fields(fields: &[&str]) -> String {
    fields.join(DELIMITER)
}

pub fn decode_fields(token: &str, expected_arity: usize) -> Result<Vec<String>, CallbackDecodeError> {
    let fields: Vec<String> = if token.is_empty() {
        Vec::new()
    } else {
        token.split(DELIMITER).map(str::to_owned).collect()
    };

    if fields.len() != expected_arity {
        return Err(CallbackDecodeError::MalformedToken {
            expected: expected_arity,
            found: fields.len(),
        });
    }

    Ok(fields)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenShape {
    RepoSelection,
    ReleaseSelection,
}

impl TokenShape {
    pub fn arity(&self) -> usize {
        match self {
            Self::RepoSelection => 2,
            Self::ReleaseSelection => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackToken {
    RepoSelection(OrgRepo),
    ReleaseSelection(OrgRepoLevel),
}

impl CallbackToken {
    pub fn shape(&self) -> TokenShape {
        match self {
            Self::RepoSelection(_) => TokenShape::RepoSelection,
            Self::ReleaseSelection(_) => TokenShape::ReleaseSelection,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::RepoSelection(org_repo) => encode_fields(&[org_repo.org(), org_repo.repo()]),
            Self::ReleaseSelection(selection) => {
                encode_fields(&[selection.org(), selection.repo(), selection.level().as_str()])
            }
        }
    }

    pub fn decode(shape: TokenShape, raw: &str) -> Result<Self, CallbackDecodeError> {
        let fields = decode_fields(raw, shape.arity())?;
        let org_repo = OrgRepo::new(fields[0].as_str(), fields[1].as_str())?;

        Ok(match shape {
            TokenShape::RepoSelection => Self::RepoSelection(org_repo),
            TokenShape::ReleaseSelection => {
                let level = fields[2].parse::<ReleaseLevel>()?;
                Self::ReleaseSelection(org_repo.with_level(level))
            }
        })
    }

    pub fn decode_repo(raw: &str) -> Result<OrgRepo, CallbackDecodeError> {
        match Self::decode(TokenShape::RepoSelection, raw)? {
            Self::RepoSelection(org_repo) => Ok(org_repo),
            Self::ReleaseSelection(selection) => Ok(selection.org_repo().clone()),
        }
    }

    pub fn decode_release(raw: &str) -> Result<OrgRepoLevel, CallbackDecodeError> {
        match Self::decode(TokenShape::ReleaseSelection, raw)? {
            Self::ReleaseSelection(selection) => Ok(selection),
            Self::RepoSelection(_) => Err(CallbackDecodeError::MalformedToken {
                expected: TokenShape::ReleaseSelection.arity(),
                found: TokenShape::RepoSelection.arity(),
            }),
        }
    }
}

/// Tokens round-trip through the chat platform, so log at most a bounded prefix.
pub fn redact_for_log(raw: &str) -> String {
    if raw.chars().count() <= LOGGED_TOKEN_LIMIT {
        return raw.to_owned();
    }
    let prefix: String = raw.chars().take(LOGGED_TOKEN_LIMIT).collect();
    format!("{prefix}…")
}
