use deckhand_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

use super::CommandResult;

/// Exit code when any readiness check fails.
pub const DOCTOR_FAILURE_EXIT_CODE: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()).map_err(|e| e.to_string()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { DOCTOR_FAILURE_EXIT_CODE };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

pub fn build_report(config: Result<AppConfig, String>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_tokens(&config));
            checks.push(check_release_targets(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error,
            });
            for name in ["token_readiness", "release_targets"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }
    checks.push(check_git_binary());

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Prefixes are already enforced by validation; this reports which token families are present.
fn check_tokens(config: &AppConfig) -> DoctorCheck {
    let github_token_set = !config.github.access_token.expose_secret().trim().is_empty();
    let status = if github_token_set { CheckStatus::Pass } else { CheckStatus::Fail };
    DoctorCheck {
        name: "token_readiness",
        status,
        details: format!(
            "slack app token (xapp-), slack bot token (xoxb-), github token for `{}`{}",
            config.github.username,
            if github_token_set { "" } else { " is missing" }
        ),
    }
}

fn check_release_targets(config: &AppConfig) -> DoctorCheck {
    let repositories: Vec<String> = config
        .release_targets()
        .iter()
        .map(|target| format!("{}@{}", target.repository_url, target.base_branch))
        .collect();
    DoctorCheck {
        name: "release_targets",
        status: if repositories.is_empty() { CheckStatus::Fail } else { CheckStatus::Pass },
        details: format!("{} configured: {}", repositories.len(), repositories.join(", ")),
    }
}

fn check_git_binary() -> DoctorCheck {
    match which::which("git") {
        Ok(path) => DoctorCheck {
            name: "git_binary",
            status: CheckStatus::Pass,
            details: format!("found at {}", path.display()),
        },
        Err(error) => DoctorCheck {
            name: "git_binary",
            status: CheckStatus::Fail,
            details: format!("git is required to clone and push release branches: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
