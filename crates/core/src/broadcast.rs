//! Track automation on the external broadcast service.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::callback::{encode_fields, CallbackDecodeError, DELIMITER};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: i32,
    pub name: String,
    pub enabled: bool,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}  {:<24}  {}", self.id, self.name, self.enabled)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("track {0} was not found")]
    TrackNotFound(i32),
    #[error("broadcast service unavailable: {0}")]
    Unavailable(String),
    #[error("broadcast service returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait BroadcastClient: Send + Sync {
    async fn list_tracks(&self) -> Result<Vec<Track>, BroadcastError>;
    async fn set_automation(&self, track_id: i32, enabled: bool) -> Result<Track, BroadcastError>;
    /// Advances the track to its next scene regardless of the automation flag.
    async fn move_scene_to_next(&self, track_id: i32) -> Result<(), BroadcastError>;
}

/// Track carried by a scene-switch button, encoded as `<id>__<name>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneTrack {
    pub id: i32,
    pub name: String,
}

impl SceneTrack {
    pub fn encode(&self) -> String {
        encode_fields(&[&self.id.to_string(), &self.name])
    }

    /// The name is everything after the first delimiter, so it may contain `__` itself.
    pub fn decode(raw: &str) -> Result<Self, CallbackDecodeError> {
        let Some((id, name)) = raw.split_once(DELIMITER) else {
            let found = usize::from(!raw.is_empty());
            return Err(CallbackDecodeError::MalformedToken { expected: 2, found });
        };
        if name.is_empty() {
            return Err(CallbackDecodeError::MalformedToken { expected: 2, found: 1 });
        }
        let id = id.parse::<i32>().map_err(|_| CallbackDecodeError::InvalidTrackId(id.to_owned()))?;
        Ok(Self { id, name: name.to_owned() })
    }
}

impl From<&Track> for SceneTrack {
    fn from(track: &Track) -> Self {
        Self { id: track.id, name: track.name.clone() }
    }
}

pub fn automation_summary(track: &Track) -> String {
    let state = if track.enabled { "enabled" } else { "disabled" };
    format!("Automatic switching of track {} {state}", track.name)
}
