use std::env;
use std::fs;
use std::path::Path;

use deckhand_core::config::{resolve_config_path, AppConfig, LoadOptions};
use deckhand_core::release::ReleaseTarget;
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use super::CommandResult;

/// Exit code for configuration that fails to load or validate.
pub const CONFIG_FAILURE_EXIT_CODE: u8 = 2;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Field {
    Field { key, value: value.into(), env_keys }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                CONFIG_FAILURE_EXIT_CODE,
            )
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source =
            field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult::ok(lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("slack.app_token", redact_secret(&config.slack.app_token), &["DECKHAND_SLACK_APP_TOKEN"]),
        field("slack.bot_token", redact_secret(&config.slack.bot_token), &["DECKHAND_SLACK_BOT_TOKEN"]),
        field("slack.api_base", config.slack.api_base.as_str(), &["DECKHAND_SLACK_API_BASE"]),
        field("github.username", config.github.username.as_str(), &["DECKHAND_GITHUB_USERNAME"]),
        field(
            "github.access_token",
            redact_secret(&config.github.access_token),
            &["DECKHAND_GITHUB_ACCESS_TOKEN"],
        ),
        field("github.api_base", config.github.api_base.as_str(), &["DECKHAND_GITHUB_API_BASE"]),
        field("github.git_base_url", config.github.git_base_url.as_str(), &[]),
        field("release.targets", render_targets(&config.release.targets), &["DECKHAND_RELEASE_TARGETS"]),
        field(
            "release.timeout_secs",
            config.release.timeout_secs.to_string(),
            &["DECKHAND_RELEASE_TIMEOUT_SECS"],
        ),
        field(
            "release.work_root",
            config
                .release
                .work_root
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<system temp>".to_string()),
            &["DECKHAND_RELEASE_WORK_ROOT"],
        ),
        field(
            "broadcast.endpoint_url",
            config.broadcast.endpoint_url.as_deref().unwrap_or("<unset>"),
            &["DECKHAND_BROADCAST_ENDPOINT_URL"],
        ),
        field(
            "broadcast.timeout_secs",
            config.broadcast.timeout_secs.to_string(),
            &["DECKHAND_BROADCAST_TIMEOUT_SECS"],
        ),
        field(
            "help.release_url",
            config.help.release_url.as_deref().unwrap_or("<unset>"),
            &["DECKHAND_HELP_RELEASE_URL"],
        ),
        field(
            "help.broadcast_url",
            config.help.broadcast_url.as_deref().unwrap_or("<unset>"),
            &["DECKHAND_HELP_BROADCAST_URL"],
        ),
        field("server.bind_address", config.server.bind_address.as_str(), &["DECKHAND_SERVER_BIND_ADDRESS"]),
        field(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["DECKHAND_SERVER_HEALTH_CHECK_PORT"],
        ),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["DECKHAND_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field(
            "logging.level",
            config.logging.level.as_str(),
            &["DECKHAND_LOGGING_LEVEL", "DECKHAND_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["DECKHAND_LOGGING_FORMAT", "DECKHAND_LOG_FORMAT"],
        ),
    ]
}

fn render_targets(targets: &[ReleaseTarget]) -> String {
    let rendered: Vec<String> = targets
        .iter()
        .map(|target| format!("{}@{}", target.repository_url, target.base_branch))
        .collect();
    format!("[{}]", rendered.join(", "))
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &SecretString) -> String {
    redact_token(secret.expose_secret())
}

/// Keeps the token family prefix (`xapp-`, `xoxb-`, `ghp_`) and hides the rest.
pub fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.find(|ch| ch == '-' || ch == '_') {
        Some(index) => format!("{}***", &trimmed[..=index]),
        None => "<redacted>".to_string(),
    }
}
