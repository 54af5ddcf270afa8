//! Recording fakes for the chat, git, GitHub and broadcast seams.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deckhand_core::broadcast::{BroadcastClient, BroadcastError, Track};
use deckhand_core::release::{
    CloneOptions, ExternalError, GitCommandClient, GitHubApiClient, NewPullRequest,
};
use tokio::sync::Mutex;

use crate::api::{ChatClient, ChatError};
use crate::blocks::MessageTemplate;

#[derive(Default)]
pub struct RecordingChat {
    pub fail_updates: bool,
    posted: Mutex<Vec<(String, MessageTemplate)>>,
    threaded: Mutex<Vec<(String, String, MessageTemplate)>>,
    updated: Mutex<Vec<(String, String, MessageTemplate)>>,
}

impl RecordingChat {
    pub fn failing_updates() -> Self {
        Self { fail_updates: true, ..Self::default() }
    }

    pub async fn posted(&self) -> Vec<(String, MessageTemplate)> {
        self.posted.lock().await.clone()
    }

    /// `(channel, thread_ts, message)` for every thread reply.
    pub async fn threaded(&self) -> Vec<(String, String, MessageTemplate)> {
        self.threaded.lock().await.clone()
    }

    pub async fn updated(&self) -> Vec<(String, String, MessageTemplate)> {
        self.updated.lock().await.clone()
    }

    pub async fn last_update(&self) -> Option<MessageTemplate> {
        self.updated.lock().await.last().map(|(_, _, message)| message.clone())
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<String, ChatError> {
        let mut posted = self.posted.lock().await;
        posted.push((channel.to_owned(), message.clone()));
        Ok(format!("1730000000.{:06}", posted.len()))
    }

    async fn post_thread_reply(
        &self,
        channel: &str,
        thread_ts: &str,
        message: &MessageTemplate,
    ) -> Result<String, ChatError> {
        let mut threaded = self.threaded.lock().await;
        threaded.push((channel.to_owned(), thread_ts.to_owned(), message.clone()));
        Ok(format!("{thread_ts}.{}", threaded.len()))
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        message: &MessageTemplate,
    ) -> Result<(), ChatError> {
        self.updated.lock().await.push((channel.to_owned(), ts.to_owned(), message.clone()));
        if self.fail_updates {
            return Err(ChatError::Api { method: "chat.update", error: "ratelimited".to_owned() });
        }
        Ok(())
    }
}

/// Git and GitHub in one fake; calls are recorded in order and `fail_at` names the
/// call that returns an error.
#[derive(Default)]
pub struct RecordingRelease {
    pub fail_at: Option<&'static str>,
    pub pull_request_number: u64,
    calls: Mutex<Vec<String>>,
}

impl RecordingRelease {
    pub fn succeeding(pull_request_number: u64) -> Self {
        Self { pull_request_number, ..Self::default() }
    }

    pub fn failing_at(call: &'static str) -> Self {
        Self { fail_at: Some(call), pull_request_number: 1, ..Self::default() }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, name: &'static str, detail: String) -> Result<(), ExternalError> {
        self.calls.lock().await.push(format!("{name} {detail}").trim().to_owned());
        if self.fail_at == Some(name) {
            return Err(ExternalError::new(format!("{name} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl GitCommandClient for RecordingRelease {
    async fn clone_repository(
        &self,
        org: &str,
        repo: &str,
        options: &CloneOptions,
    ) -> Result<PathBuf, ExternalError> {
        let branch = options.branch.clone().unwrap_or_default();
        self.record("clone", format!("{org}/{repo}@{branch}")).await?;
        Ok(PathBuf::from(format!("/tmp/deckhand/{repo}")))
    }

    async fn switch_new_branch(&self, _work_dir: &Path, branch: &str) -> Result<(), ExternalError> {
        self.record("switch", branch.to_owned()).await
    }

    async fn commit_all_allow_empty(
        &self,
        _work_dir: &Path,
        message: &str,
    ) -> Result<(), ExternalError> {
        self.record("commit", message.to_owned()).await
    }

    async fn push(&self, _work_dir: &Path) -> Result<(), ExternalError> {
        self.record("push", String::new()).await
    }

    async fn remove(&self, work_dir: &Path) -> Result<(), ExternalError> {
        self.record("remove", work_dir.display().to_string()).await
    }
}

#[async_trait]
impl GitHubApiClient for RecordingRelease {
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<u64, ExternalError> {
        self.record("create_pr", format!("{}->{}", request.head, request.base)).await?;
        Ok(self.pull_request_number)
    }

    async fn label_pull_request(
        &self,
        _org: &str,
        _repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), ExternalError> {
        self.record("label", format!("#{number} {}", labels.join(","))).await
    }

    async fn delete_branch(&self, _org: &str, _repo: &str, branch: &str) -> Result<(), ExternalError> {
        self.record("delete_branch", branch.to_owned()).await
    }
}

pub struct StaticBroadcast {
    tracks: Mutex<Vec<Track>>,
    scene_moves: Mutex<Vec<i32>>,
}

impl StaticBroadcast {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks: Mutex::new(tracks), scene_moves: Mutex::new(Vec::new()) }
    }

    /// Track ids passed to `move_scene_to_next`, in call order.
    pub async fn scene_moves(&self) -> Vec<i32> {
        self.scene_moves.lock().await.clone()
    }
}

#[async_trait]
impl BroadcastClient for StaticBroadcast {
    async fn list_tracks(&self) -> Result<Vec<Track>, BroadcastError> {
        Ok(self.tracks.lock().await.clone())
    }

    async fn set_automation(&self, track_id: i32, enabled: bool) -> Result<Track, BroadcastError> {
        let mut tracks = self.tracks.lock().await;
        let track = tracks
            .iter_mut()
            .find(|track| track.id == track_id)
            .ok_or(BroadcastError::TrackNotFound(track_id))?;
        track.enabled = enabled;
        Ok(track.clone())
    }

    async fn move_scene_to_next(&self, track_id: i32) -> Result<(), BroadcastError> {
        if !self.tracks.lock().await.iter().any(|track| track.id == track_id) {
            return Err(BroadcastError::TrackNotFound(track_id));
        }
        self.scene_moves.lock().await.push(track_id);
        Ok(())
    }
}
