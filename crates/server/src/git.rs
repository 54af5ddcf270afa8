//! `git` subprocess runner behind [`GitCommandClient`].
//!
//! Every clone lands in its own temporary directory, so concurrent releases of the
//! same repository never share a checkout. The directory is owned by the runner
//! until [`GitCommandClient::remove`] closes it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use deckhand_core::config::GitHubConfig;
use deckhand_core::release::{CloneOptions, ExternalError, GitCommandClient};
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

const REDACTED: &str = "***";

pub struct GitCli {
    program: PathBuf,
    username: String,
    access_token: SecretString,
    git_base_url: String,
    work_root: Option<PathBuf>,
    checkouts: Mutex<HashMap<PathBuf, TempDir>>,
}

impl GitCli {
    pub fn new(program: PathBuf, github: &GitHubConfig, work_root: Option<PathBuf>) -> Self {
        Self {
            program,
            username: github.username.clone(),
            access_token: github.access_token.clone(),
            git_base_url: github.git_base_url.trim_end_matches('/').to_owned(),
            work_root,
            checkouts: Mutex::new(HashMap::new()),
        }
    }

    /// `git` from `PATH`, falling back to the bare name so the failure surfaces on first use.
    pub fn discover_program() -> PathBuf {
        which::which("git").unwrap_or_else(|_| PathBuf::from("git"))
    }

    fn commit_email(&self) -> String {
        format!("{}@users.noreply.github.com", self.username)
    }

    /// Remote URL with credentials embedded for http(s) hosts.
    fn remote_url(&self, org: &str, repo: &str) -> String {
        let base = &self.git_base_url;
        let authenticated = ["https://", "http://"].iter().find_map(|scheme| {
            base.strip_prefix(scheme).map(|host| {
                format!(
                    "{scheme}{}:{}@{host}",
                    self.username,
                    self.access_token.expose_secret() // ubs:ignore
                )
            })
        });
        format!("{}/{org}/{repo}", authenticated.as_deref().unwrap_or(base))
    }

    fn redact(&self, text: &str) -> String {
        let token = self.access_token.expose_secret(); // ubs:ignore
        if token.is_empty() {
            text.to_owned()
        } else {
            text.replace(token, REDACTED)
        }
    }

    fn scratch_dir(&self, repo: &str) -> std::io::Result<TempDir> {
        let prefix = format!("deckhand-{repo}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }

    async fn git(&self, work_dir: Option<&Path>, args: &[&str]) -> Result<String, ExternalError> {
        let mut command = Command::new(&self.program);
        command.kill_on_drop(true);
        if let Some(dir) = work_dir {
            command.arg("-C").arg(dir);
        }
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let subcommand = args.first().copied().unwrap_or_default();
        debug!(event_name = "release.git.command", subcommand, "running git");

        let output = command.output().await.map_err(|error| {
            ExternalError::new(format!("failed to spawn {}: {error}", self.program.display()))
        })?;
        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_owned());
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExternalError::new(self.redact(&format!(
                "git {subcommand} failed with status {status}: {}",
                stderr.trim()
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn track(&self, checkout: PathBuf, dir: TempDir) -> Result<(), ExternalError> {
        let mut checkouts =
            self.checkouts.lock().map_err(|_| ExternalError::new("checkout registry poisoned"))?;
        checkouts.insert(checkout, dir);
        Ok(())
    }

    fn untrack(&self, checkout: &Path) -> Result<Option<TempDir>, ExternalError> {
        let mut checkouts =
            self.checkouts.lock().map_err(|_| ExternalError::new("checkout registry poisoned"))?;
        Ok(checkouts.remove(checkout))
    }
}

#[async_trait]
impl GitCommandClient for GitCli {
    async fn clone_repository(
        &self,
        org: &str,
        repo: &str,
        options: &CloneOptions,
    ) -> Result<PathBuf, ExternalError> {
        let dir = self
            .scratch_dir(repo)
            .map_err(|error| ExternalError::new(format!("failed to create clone directory: {error}")))?;
        let checkout = dir.path().join(repo);
        let checkout_arg = checkout.to_string_lossy().into_owned();
        let remote = self.remote_url(org, repo);
        let depth = options.depth.map(|depth| depth.to_string());

        let mut args = vec!["clone", "--quiet"];
        if let Some(depth) = depth.as_deref() {
            args.extend(["--depth", depth]);
        }
        if let Some(branch) = options.branch.as_deref() {
            args.extend(["--branch", branch]);
        }
        args.extend([remote.as_str(), checkout_arg.as_str()]);

        // `dir` is dropped, and the partial clone removed, on any early return.
        self.git(None, &args).await?;
        self.git(Some(checkout.as_path()), &["config", "user.name", &self.username]).await?;
        self.git(Some(checkout.as_path()), &["config", "user.email", &self.commit_email()]).await?;

        self.track(checkout.clone(), dir)?;
        Ok(checkout)
    }

    async fn switch_new_branch(&self, work_dir: &Path, branch: &str) -> Result<(), ExternalError> {
        self.git(Some(work_dir), &["switch", "-c", branch]).await.map(drop)
    }

    async fn commit_all_allow_empty(
        &self,
        work_dir: &Path,
        message: &str,
    ) -> Result<(), ExternalError> {
        self.git(Some(work_dir), &["add", "-A"]).await?;
        self.git(Some(work_dir), &["commit", "--quiet", "--allow-empty", "-m", message]).await.map(drop)
    }

    async fn push(&self, work_dir: &Path) -> Result<(), ExternalError> {
        self.git(Some(work_dir), &["push", "--quiet", "origin", "HEAD"]).await.map(drop)
    }

    async fn remove(&self, work_dir: &Path) -> Result<(), ExternalError> {
        let Some(dir) = self.untrack(work_dir)? else {
            return Err(ExternalError::new(format!(
                "{} is not a checkout owned by this runner",
                work_dir.display()
            )));
        };
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|error| ExternalError::new(format!("cleanup task failed: {error}")))?
            .map_err(|error| ExternalError::new(format!("failed to remove checkout: {error}")))
    }
}
