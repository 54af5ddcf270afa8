use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::release::OrgRepoLevel;

pub const HEAD_BRANCH_PREFIX: &str = "release/bot_";
pub const COMMIT_MESSAGE: &str = "[Bot] for release!!";
pub const PULL_REQUEST_TITLE: &str = "[deckhand] Automatic Release";
pub const PULL_REQUEST_BODY: &str = "Automatic Release";

/// Upper bound for each cleanup call made after the workflow deadline.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloneOptions {
    pub branch: Option<String>,
    pub depth: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPullRequest {
    pub org: String,
    pub repo: String,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ExternalError(pub String);

impl ExternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[async_trait]
pub trait GitCommandClient: Send + Sync {
    async fn clone_repository(
        &self,
        org: &str,
        repo: &str,
        options: &CloneOptions,
    ) -> Result<PathBuf, ExternalError>;
    async fn switch_new_branch(&self, work_dir: &Path, branch: &str) -> Result<(), ExternalError>;
    async fn commit_all_allow_empty(&self, work_dir: &Path, message: &str)
        -> Result<(), ExternalError>;
    async fn push(&self, work_dir: &Path) -> Result<(), ExternalError>;
    async fn remove(&self, work_dir: &Path) -> Result<(), ExternalError>;
}

#[async_trait]
pub trait GitHubApiClient: Send + Sync {
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<u64, ExternalError>;
    async fn label_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), ExternalError>;
    async fn delete_branch(&self, org: &str, repo: &str, branch: &str) -> Result<(), ExternalError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowStep {
    Clone,
    SwitchBranch,
    Commit,
    Push,
    CreatePullRequest,
    Label,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clone => "clone",
            Self::SwitchBranch => "switch_branch",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::CreatePullRequest => "create_pull_request",
            Self::Label => "label",
        })
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("release step `{step}` failed: {source}")]
    Step {
        step: WorkflowStep,
        #[source]
        source: ExternalError,
    },
    #[error("release workflow exceeded {0:?}")]
    TimedOut(Duration),
}

impl ReleaseError {
    pub fn step(&self) -> Option<WorkflowStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            Self::TimedOut(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub target: OrgRepoLevel,
    pub base_branch: String,
    pub correlation_id: String,
}

impl ReleaseRequest {
    pub fn head_branch(&self) -> String {
        head_branch_name(&self.correlation_id)
    }
}

/// Branch-name-safe head branch derived from the chat message timestamp.
pub fn head_branch_name(correlation_id: &str) -> String {
    let suffix: String = correlation_id
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') { ch } else { '-' })
        .collect();
    format!("{HEAD_BRANCH_PREFIX}{suffix}")
}

#[derive(Default)]
struct Progress {
    push_started: bool,
    pushed: bool,
}

impl Progress {
    /// A push cut off by the deadline may still have reached the remote.
    fn branch_may_exist(&self, result: &Result<u64, ReleaseError>) -> bool {
        match result {
            Ok(_) => false,
            Err(ReleaseError::TimedOut(_)) => self.push_started,
            Err(ReleaseError::Step { .. }) => self.pushed,
        }
    }
}

/// Clone → branch → empty commit → push → PR → label.
///
/// The clone is removed on every exit path once it exists, including when the
/// deadline fires mid-step. A pushed branch is deleted again when PR creation or
/// labelling does not complete, and on a deadline that fires once the push began.
/// Each cleanup call is bounded by [`CLEANUP_TIMEOUT`].
#[derive(Clone)]
pub struct ReleaseWorkflow {
    git: Arc<dyn GitCommandClient>,
    github: Arc<dyn GitHubApiClient>,
    timeout: Duration,
}

impl ReleaseWorkflow {
    pub fn new(
        git: Arc<dyn GitCommandClient>,
        github: Arc<dyn GitHubApiClient>,
        timeout: Duration,
    ) -> Self {
        Self { git, github, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(&self, request: &ReleaseRequest) -> Result<u64, ReleaseError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let target = &request.target;
        let options = CloneOptions { branch: Some(request.base_branch.clone()), depth: Some(1) };

        let work_dir = match tokio::time::timeout_at(
            deadline,
            self.git.clone_repository(target.org(), target.repo(), &options),
        )
        .await
        {
            Ok(Ok(work_dir)) => work_dir,
            Ok(Err(source)) => return Err(step_failed(request, WorkflowStep::Clone, source)),
            Err(_) => return Err(ReleaseError::TimedOut(self.timeout)),
        };

        let head_branch = request.head_branch();
        let mut progress = Progress::default();
        let result = match tokio::time::timeout_at(
            deadline,
            self.publish(request, &work_dir, &head_branch, &mut progress),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReleaseError::TimedOut(self.timeout)),
        };

        if progress.branch_may_exist(&result) {
            self.delete_remote_branch(request, &head_branch).await;
        }

        let removed = bounded_cleanup(self.git.remove(&work_dir)).await;
        if let Err(error) = removed {
            warn!(
                event_name = "release.workflow.cleanup_failed",
                correlation_id = %request.correlation_id,
                work_dir = %work_dir.display(),
                error = %error,
                "failed to remove working directory"
            );
        }

        if let Ok(number) = &result {
            info!(
                event_name = "release.workflow.completed",
                correlation_id = %request.correlation_id,
                repository = %target.org_repo(),
                level = %target.level(),
                pull_request = number,
                "release pull request created"
            );
        }

        result
    }

    async fn publish(
        &self,
        request: &ReleaseRequest,
        work_dir: &Path,
        head_branch: &str,
        progress: &mut Progress,
    ) -> Result<u64, ReleaseError> {
        let target = &request.target;

        self.git
            .switch_new_branch(work_dir, head_branch)
            .await
            .map_err(|source| step_failed(request, WorkflowStep::SwitchBranch, source))?;
        self.git
            .commit_all_allow_empty(work_dir, COMMIT_MESSAGE)
            .await
            .map_err(|source| step_failed(request, WorkflowStep::Commit, source))?;
        progress.push_started = true;
        self.git
            .push(work_dir)
            .await
            .map_err(|source| step_failed(request, WorkflowStep::Push, source))?;
        progress.pushed = true;

        let number = self
            .github
            .create_pull_request(&NewPullRequest {
                org: target.org().to_owned(),
                repo: target.repo().to_owned(),
                head: head_branch.to_owned(),
                base: request.base_branch.clone(),
                title: PULL_REQUEST_TITLE.to_owned(),
                body: PULL_REQUEST_BODY.to_owned(),
            })
            .await
            .map_err(|source| step_failed(request, WorkflowStep::CreatePullRequest, source))?;

        self.github
            .label_pull_request(
                target.org(),
                target.repo(),
                number,
                &[target.level().as_str().to_owned()],
            )
            .await
            .map_err(|source| step_failed(request, WorkflowStep::Label, source))?;

        Ok(number)
    }

    async fn delete_remote_branch(&self, request: &ReleaseRequest, head_branch: &str) {
        let target = &request.target;
        let deleted =
            bounded_cleanup(self.github.delete_branch(target.org(), target.repo(), head_branch)).await;
        match deleted {
            Ok(()) => info!(
                event_name = "release.workflow.branch_deleted",
                correlation_id = %request.correlation_id,
                branch = head_branch,
                "deleted orphaned release branch"
            ),
            Err(error) => warn!(
                event_name = "release.workflow.branch_delete_failed",
                correlation_id = %request.correlation_id,
                branch = head_branch,
                error = %error,
                "failed to delete orphaned release branch"
            ),
        }
    }
}

async fn bounded_cleanup(
    call: impl std::future::Future<Output = Result<(), ExternalError>>,
) -> Result<(), ExternalError> {
    tokio::time::timeout(CLEANUP_TIMEOUT, call)
        .await
        .unwrap_or_else(|_| Err(ExternalError::new(format!("cleanup exceeded {CLEANUP_TIMEOUT:?}"))))
}

fn step_failed(request: &ReleaseRequest, step: WorkflowStep, source: ExternalError) -> ReleaseError {
    warn!(
        event_name = "release.workflow.step_failed",
        correlation_id = %request.correlation_id,
        step = %step,
        error = %source,
        "release workflow step failed"
    );
    ReleaseError::Step { step, source }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{CloneOptions, ExternalError, GitCommandClient, GitHubApiClient, NewPullRequest};

    /// Records every call in order; `fail_at` names the calls that return an error and
    /// `hang_at` the call that never completes.
    #[derive(Default)]
    pub struct ScriptedRelease {
        pub fail_at: Vec<&'static str>,
        pub hang_at: Option<&'static str>,
        pub pull_request_number: u64,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedRelease {
        pub fn failing_at(step: &'static str) -> Self {
            Self { fail_at: vec![step], pull_request_number: 7, ..Self::default() }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }

        pub fn count(&self, name: &str) -> usize {
            self.calls().iter().filter(|call| call.starts_with(name)).count()
        }

        async fn record(&self, name: &'static str, detail: String) -> Result<(), ExternalError> {
            self.calls.lock().expect("lock").push(format!("{name} {detail}").trim().to_owned());
            if self.hang_at == Some(name) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_at.contains(&name) {
                return Err(ExternalError::new(format!("{name} injected failure")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GitCommandClient for ScriptedRelease {
        async fn clone_repository(
            &self,
            org: &str,
            repo: &str,
            options: &CloneOptions,
        ) -> Result<PathBuf, ExternalError> {
            let branch = options.branch.clone().unwrap_or_default();
            self.record("clone", format!("{org}/{repo}@{branch}")).await?;
            Ok(PathBuf::from(format!("/tmp/{repo}")))
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
    impl GitHubApiClient for ScriptedRelease {
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
}
