use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::release::{OrgRepo, ReleaseTarget, ReleaseTargets};

pub const DEFAULT_BASE_BRANCH: &str = "main";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub github: GitHubConfig,
    pub release: ReleaseConfig,
    pub broadcast: BroadcastConfig,
    pub help: HelpConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct GitHubConfig {
    pub username: String,
    pub access_token: SecretString,
    pub api_base: String,
    pub git_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ReleaseConfig {
    pub targets: Vec<ReleaseTarget>,
    pub timeout_secs: u64,
    pub work_root: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct BroadcastConfig {
    pub endpoint_url: Option<String>,
    pub timeout_secs: u64,
}

/// Documentation links rendered next to each command family in `help`.
#[derive(Clone, Debug, Default)]
pub struct HelpConfig {
    pub release_url: Option<String>,
    pub broadcast_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub github_username: Option<String>,
    pub github_access_token: Option<String>,
    pub release_timeout_secs: Option<u64>,
    pub broadcast_endpoint_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                api_base: "https://slack.com/api".to_string(),
            },
            github: GitHubConfig {
                username: String::new(),
                access_token: String::new().into(),
                api_base: "https://api.github.com".to_string(),
                git_base_url: crate::release::GITHUB_BASE_URL.to_string(),
            },
            release: ReleaseConfig { targets: Vec::new(), timeout_secs: 600, work_root: None },
            broadcast: BroadcastConfig { endpoint_url: None, timeout_secs: 10 },
            help: HelpConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("deckhand.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn release_targets(&self) -> ReleaseTargets {
        ReleaseTargets::new(self.release.targets.clone())
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release.timeout_secs)
    }

    pub fn broadcast_enabled(&self) -> bool {
        self.broadcast.endpoint_url.is_some()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(slack_app_token_value) = slack.app_token {
                self.slack.app_token = secret_value(slack_app_token_value); // ubs:ignore
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value); // ubs:ignore
            }
            if let Some(api_base) = slack.api_base {
                self.slack.api_base = api_base;
            }
        }

        if let Some(github) = patch.github {
            if let Some(username) = github.username {
                self.github.username = username;
            }
            if let Some(github_access_token_value) = github.access_token {
                self.github.access_token = secret_value(github_access_token_value); // ubs:ignore
            }
            if let Some(api_base) = github.api_base {
                self.github.api_base = api_base;
            }
            if let Some(git_base_url) = github.git_base_url {
                self.github.git_base_url = git_base_url;
            }
        }

        if let Some(release) = patch.release {
            if let Some(targets) = release.targets {
                self.release.targets = targets
                    .into_iter()
                    .map(|target| ReleaseTarget {
                        repository_url: target.repository_url,
                        base_branch: target
                            .base_branch
                            .filter(|branch| !branch.trim().is_empty())
                            .unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string()),
                    })
                    .collect();
            }
            if let Some(timeout_secs) = release.timeout_secs {
                self.release.timeout_secs = timeout_secs;
            }
            if let Some(work_root) = release.work_root {
                self.release.work_root = Some(work_root);
            }
        }

        if let Some(broadcast) = patch.broadcast {
            if let Some(endpoint_url) = broadcast.endpoint_url {
                self.broadcast.endpoint_url = Some(endpoint_url);
            }
            if let Some(timeout_secs) = broadcast.timeout_secs {
                self.broadcast.timeout_secs = timeout_secs;
            }
        }

        if let Some(help) = patch.help {
            if let Some(release_url) = help.release_url {
                self.help.release_url = Some(release_url);
            }
            if let Some(broadcast_url) = help.broadcast_url {
                self.help.broadcast_url = Some(broadcast_url);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DECKHAND_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value); // ubs:ignore
        }
        if let Some(value) = read_env("DECKHAND_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value); // ubs:ignore
        }
        if let Some(value) = read_env("DECKHAND_SLACK_API_BASE") {
            self.slack.api_base = value;
        }

        if let Some(value) = read_env("DECKHAND_GITHUB_USERNAME") {
            self.github.username = value;
        }
        if let Some(value) = read_env("DECKHAND_GITHUB_ACCESS_TOKEN") {
            self.github.access_token = secret_value(value); // ubs:ignore
        }
        if let Some(value) = read_env("DECKHAND_GITHUB_API_BASE") {
            self.github.api_base = value;
        }

        if let Some(value) = read_env("DECKHAND_RELEASE_TARGETS") {
            self.release.targets = parse_targets(&value);
        }
        if let Some(value) = read_env("DECKHAND_RELEASE_TIMEOUT_SECS") {
            self.release.timeout_secs = parse_u64("DECKHAND_RELEASE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DECKHAND_RELEASE_WORK_ROOT") {
            self.release.work_root = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("DECKHAND_BROADCAST_ENDPOINT_URL") {
            self.broadcast.endpoint_url = Some(value);
        }
        if let Some(value) = read_env("DECKHAND_BROADCAST_TIMEOUT_SECS") {
            self.broadcast.timeout_secs = parse_u64("DECKHAND_BROADCAST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DECKHAND_HELP_RELEASE_URL") {
            self.help.release_url = Some(value);
        }
        if let Some(value) = read_env("DECKHAND_HELP_BROADCAST_URL") {
            self.help.broadcast_url = Some(value);
        }

        if let Some(value) = read_env("DECKHAND_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DECKHAND_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("DECKHAND_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("DECKHAND_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DECKHAND_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("DECKHAND_LOGGING_LEVEL").or_else(|| read_env("DECKHAND_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DECKHAND_LOGGING_FORMAT").or_else(|| read_env("DECKHAND_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token); // ubs:ignore
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token); // ubs:ignore
        }
        if let Some(github_username) = overrides.github_username {
            self.github.username = github_username;
        }
        if let Some(github_access_token) = overrides.github_access_token {
            self.github.access_token = secret_value(github_access_token); // ubs:ignore
        }
        if let Some(timeout_secs) = overrides.release_timeout_secs {
            self.release.timeout_secs = timeout_secs;
        }
        if let Some(endpoint_url) = overrides.broadcast_endpoint_url {
            self.broadcast.endpoint_url = Some(endpoint_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_github(&self.github)?;
        validate_release(&self.release)?;
        validate_broadcast(&self.broadcast)?;
        validate_help(&self.help)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("deckhand.toml"), PathBuf::from("config/deckhand.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

/// `DECKHAND_RELEASE_TARGETS`: comma separated `<repository_url>[@<base_branch>]`.
fn parse_targets(value: &str) -> Vec<ReleaseTarget> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.rsplit_once('@') {
            Some((url, branch)) if !branch.trim().is_empty() => ReleaseTarget {
                repository_url: url.trim().to_string(),
                base_branch: branch.trim().to_string(),
            },
            _ => ReleaseTarget {
                repository_url: entry.trim_end_matches('@').to_string(),
                base_branch: DEFAULT_BASE_BRANCH.to_string(),
            },
        })
        .collect()
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret(); // ubs:ignore
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret(); // ubs:ignore
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    validate_http_url("slack.api_base", &slack.api_base)
}

fn validate_github(github: &GitHubConfig) -> Result<(), ConfigError> {
    if github.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "github.username is required to push release branches".to_string(),
        ));
    }
    if github.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "github.access_token is required (needs `repo` scope to push and open pull requests)"
                .to_string(),
        ));
    }

    validate_http_url("github.api_base", &github.api_base)?;
    validate_http_url("github.git_base_url", &github.git_base_url)
}

fn validate_release(release: &ReleaseConfig) -> Result<(), ConfigError> {
    if release.targets.is_empty() {
        return Err(ConfigError::Validation(
            "release.targets must list at least one repository".to_string(),
        ));
    }

    let mut seen = Vec::with_capacity(release.targets.len());
    for target in &release.targets {
        let org_repo = OrgRepo::from_repository_url(&target.repository_url).map_err(|error| {
            ConfigError::Validation(format!("release.targets: {error}"))
        })?;
        if target.base_branch.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "release.targets: base_branch for `{org_repo}` must not be empty"
            )));
        }
        if seen.contains(&org_repo) {
            return Err(ConfigError::Validation(format!(
                "release.targets: `{org_repo}` is listed more than once"
            )));
        }
        seen.push(org_repo);
    }

    if release.timeout_secs == 0 || release.timeout_secs > 3600 {
        return Err(ConfigError::Validation(
            "release.timeout_secs must be in range 1..=3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_broadcast(broadcast: &BroadcastConfig) -> Result<(), ConfigError> {
    if let Some(endpoint_url) = &broadcast.endpoint_url {
        validate_http_url("broadcast.endpoint_url", endpoint_url)?;
    }

    if broadcast.timeout_secs == 0 || broadcast.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "broadcast.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_help(help: &HelpConfig) -> Result<(), ConfigError> {
    if let Some(url) = &help.release_url {
        validate_http_url("help.release_url", url)?;
    }
    if let Some(url) = &help.broadcast_url {
        validate_http_url("help.broadcast_url", url)?;
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{key} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    github: Option<GitHubPatch>,
    release: Option<ReleasePatch>,
    broadcast: Option<BroadcastPatch>,
    help: Option<HelpPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GitHubPatch {
    username: Option<String>,
    access_token: Option<String>,
    api_base: Option<String>,
    git_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReleasePatch {
    targets: Option<Vec<TargetPatch>>,
    timeout_secs: Option<u64>,
    work_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct TargetPatch {
    #[serde(alias = "url")]
    repository_url: String,
    base_branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BroadcastPatch {
    endpoint_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HelpPatch {
    release_url: Option<String>,
    broadcast_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
// ubs:ignore
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED_VARS: [&str; 5] = [
        "DECKHAND_SLACK_APP_TOKEN",
        "DECKHAND_SLACK_BOT_TOKEN",
        "DECKHAND_GITHUB_USERNAME",
        "DECKHAND_GITHUB_ACCESS_TOKEN",
        "DECKHAND_RELEASE_TARGETS",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_required_vars() {
        env::set_var("DECKHAND_SLACK_APP_TOKEN", "xapp-test");
        env::set_var("DECKHAND_SLACK_BOT_TOKEN", "xoxb-test");
        env::set_var("DECKHAND_GITHUB_USERNAME", "release-bot");
        env::set_var("DECKHAND_GITHUB_ACCESS_TOKEN", "ghp-test");
        env::set_var("DECKHAND_RELEASE_TARGETS", "https://github.com/acme/widget");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SLACK_APP_TOKEN", "xapp-from-env");
        env::set_var("TEST_GITHUB_TOKEN", "ghp-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("deckhand.toml");
            fs::write(
                &path,
                r#"
[slack]
app_token = "${TEST_SLACK_APP_TOKEN}" # ubs:ignore
bot_token = "xoxb-from-file" # ubs:ignore

[github]
username = "release-bot"
access_token = "${TEST_GITHUB_TOKEN}" # ubs:ignore

[[release.targets]]
repository_url = "https://github.com/acme/widget"

[[release.targets]]
repository_url = "https://github.com/acme/gadget"
base_branch = "develop"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.slack.app_token.expose_secret() == "xapp-from-env",
                "app token should be loaded from environment",
            )?;
            ensure(
                config.github.access_token.expose_secret() == "ghp-from-env",
                "github token should be loaded from environment",
            )?;
            ensure(config.release.targets.len() == 2, "both targets should be loaded")?;
            ensure(
                config.release.targets[0].base_branch == "main",
                "base branch should default to main",
            )?;
            ensure(
                config.release.targets[1].base_branch == "develop",
                "explicit base branch should be kept",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SLACK_APP_TOKEN", "TEST_GITHUB_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("DECKHAND_LOG_LEVEL", "warn");
        env::set_var("DECKHAND_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&REQUIRED_VARS);
        clear_vars(&["DECKHAND_LOG_LEVEL", "DECKHAND_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DECKHAND_SLACK_APP_TOKEN", "xapp-from-env");
        env::set_var("DECKHAND_RELEASE_TIMEOUT_SECS", "120");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("deckhand.toml");
            fs::write(
                &path,
                r#"
[slack]
app_token = "xapp-from-file" # ubs:ignore
bot_token = "xoxb-from-file" # ubs:ignore

[github]
username = "from-file"
access_token = "ghp-from-file" # ubs:ignore

[release]
timeout_secs = 60

[[release.targets]]
url = "https://github.com/acme/widget"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    github_username: Some("from-override".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.github.username == "from-override", "override username should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.release.timeout_secs == 120, "env timeout should win over file")?;
            ensure(
                config.slack.app_token.expose_secret() == "xapp-from-env",
                "env app token should win over file and defaults",
            )?;
            ensure(
                config.slack.bot_token.expose_secret() == "xoxb-from-file",
                "file bot token should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["DECKHAND_SLACK_APP_TOKEN", "DECKHAND_RELEASE_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn env_targets_accept_optional_base_branch() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var(
            "DECKHAND_RELEASE_TARGETS",
            "https://github.com/acme/widget, https://github.com/acme/gadget@develop",
        );

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let targets = config.release_targets();

            ensure(targets.len() == 2, "two targets should be parsed")?;
            let gadget = crate::release::OrgRepo::new("acme", "gadget")
                .map_err(|err| err.to_string())?;
            ensure(
                targets.base_branch_for(&gadget) == Some("develop"),
                "explicit branch should be parsed from env",
            )?;
            ensure(config.release_timeout().as_secs() == 600, "default timeout is ten minutes")
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("DECKHAND_SLACK_APP_TOKEN", "bad");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("slack.app_token")
            );
            ensure(has_message, "validation failure should mention slack.app_token")
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }

    #[test]
    fn invalid_and_duplicate_targets_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();

        let result = (|| -> Result<(), String> {
            for (targets, needle) in [
                ("https://gitlab.com/acme/widget", "release.targets"),
                ("https://github.com/acme/widget,https://github.com/acme/widget", "more than once"),
            ] {
                env::set_var("DECKHAND_RELEASE_TARGETS", targets);
                let rejected = matches!(
                    AppConfig::load(LoadOptions::default()),
                    Err(ConfigError::Validation(ref message)) if message.contains(needle)
                );
                ensure(rejected, "bad target list should fail validation")?;
            }

            env::remove_var("DECKHAND_RELEASE_TARGETS");
            let missing = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("at least one")
            );
            ensure(missing, "empty target list should fail validation")
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }

    #[test]
    fn release_timeout_must_be_bounded() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    release_timeout_secs: Some(0),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            });
            ensure(
                matches!(error, Err(ConfigError::Validation(ref message)) if message.contains("release.timeout_secs")),
                "zero timeout should be rejected",
            )
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("DECKHAND_SLACK_APP_TOKEN", "xapp-secret-value");
        env::set_var("DECKHAND_GITHUB_ACCESS_TOKEN", "ghp-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("xapp-secret-value"),
                "debug output should not contain app token",
            )?;
            ensure(
                !debug.contains("ghp-secret-value"),
                "debug output should not contain github token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(!config.broadcast_enabled(), "broadcast is off without an endpoint")?;
            Ok(())
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }

    #[test]
    fn help_links_load_from_file_and_env_and_must_be_http() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("DECKHAND_HELP_BROADCAST_URL", "https://docs.example/track");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("deckhand.toml");
            fs::write(&path, "[help]\nrelease_url = \"https://docs.example/release\"\n")
                .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path.clone()),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                config.help.release_url.as_deref() == Some("https://docs.example/release"),
                "release help link should come from the file",
            )?;
            ensure(
                config.help.broadcast_url.as_deref() == Some("https://docs.example/track"),
                "broadcast help link should come from the environment",
            )?;

            fs::write(&path, "[help]\nrelease_url = \"docs.example/release\"\n")
                .map_err(|err| err.to_string())?;
            let error =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
            ensure(
                matches!(error, Err(ConfigError::Validation(ref message)) if message.contains("help.release_url")),
                "non-http help link should be rejected",
            )
        })();

        clear_vars(&REQUIRED_VARS);
        clear_vars(&["DECKHAND_HELP_BROADCAST_URL"]);
        result
    }
}
