pub mod workflow;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use workflow::{
    head_branch_name, CloneOptions, ExternalError, GitCommandClient, GitHubApiClient,
    NewPullRequest, ReleaseError, ReleaseRequest, ReleaseWorkflow, WorkflowStep,
};

pub const GITHUB_BASE_URL: &str = "https://github.com";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseLevel {
    Major,
    Minor,
    Patch,
}

impl ReleaseLevel {
    pub const ALL: [ReleaseLevel; 3] = [Self::Major, Self::Minor, Self::Patch];

    /// Wire value carried in callback tokens; also the label applied to the PR.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "release/major",
            Self::Minor => "release/minor",
            Self::Patch => "release/patch",
        }
    }
}

impl fmt::Display for ReleaseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseLevel {
    type Err = NameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "release/major" => Ok(Self::Major),
            "release/minor" => Ok(Self::Minor),
            "release/patch" => Ok(Self::Patch),
            other => Err(NameError::UnknownLevel(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} `{value}` contains unsupported characters")]
    InvalidCharacters { field: &'static str, value: String },
    #[error("unknown release level `{0}`")]
    UnknownLevel(String),
    #[error("`{0}` is not a https://github.com/<org>/<repo> url")]
    InvalidRepositoryUrl(String),
}

/// A GitHub repository coordinate. Names are validated on construction so the
/// callback delimiter can never appear inside them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrgRepo {
    org: String,
    repo: String,
}

impl OrgRepo {
    pub fn new(org: impl Into<String>, repo: impl Into<String>) -> Result<Self, NameError> {
        let org = org.into();
        let repo = repo.into();
        validate_name("org", &org)?;
        validate_name("repo", &repo)?;
        Ok(Self { org, repo })
    }

    pub fn from_repository_url(url: &str) -> Result<Self, NameError> {
        let path = url
            .trim()
            .trim_end_matches('/')
            .strip_prefix(GITHUB_BASE_URL)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| NameError::InvalidRepositoryUrl(url.to_owned()))?;
        let path = path.strip_suffix(".git").unwrap_or(path);

        let mut segments = path.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(org), Some(repo), None) => Self::new(org, repo)
                .map_err(|_| NameError::InvalidRepositoryUrl(url.to_owned())),
            _ => Err(NameError::InvalidRepositoryUrl(url.to_owned())),
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn repository_url(&self) -> String {
        format!("{GITHUB_BASE_URL}/{}/{}", self.org, self.repo)
    }

    pub fn pull_request_url(&self, number: u64) -> String {
        format!("{}/pull/{number}", self.repository_url())
    }

    pub fn with_level(&self, level: ReleaseLevel) -> OrgRepoLevel {
        OrgRepoLevel { org_repo: self.clone(), level }
    }
}

impl fmt::Display for OrgRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.repo)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrgRepoLevel {
    org_repo: OrgRepo,
    level: ReleaseLevel,
}

impl OrgRepoLevel {
    pub fn org_repo(&self) -> &OrgRepo {
        &self.org_repo
    }

    pub fn org(&self) -> &str {
        self.org_repo.org()
    }

    pub fn repo(&self) -> &str {
        self.org_repo.repo()
    }

    pub fn level(&self) -> ReleaseLevel {
        self.level
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), NameError> {
    if value.is_empty() {
        return Err(NameError::Empty { field });
    }

    let allowed =
        value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    // An edge `_` would merge with the neighbouring `__` delimiter in a callback token.
    let edge_underscore = value.starts_with('_') || value.ends_with('_');
    if !allowed || edge_underscore || value.contains(crate::callback::DELIMITER) {
        return Err(NameError::InvalidCharacters { field, value: value.to_owned() });
    }

    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub repository_url: String,
    pub base_branch: String,
}

/// Configured release targets, read-only after startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseTargets {
    targets: Vec<ReleaseTarget>,
}

impl ReleaseTargets {
    pub fn new(targets: Vec<ReleaseTarget>) -> Self {
        Self { targets }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReleaseTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Matches on the parsed org and repo, so `.git` and trailing-slash spellings of a
    /// configured URL resolve to the same target.
    pub fn find(&self, org_repo: &OrgRepo) -> Option<&ReleaseTarget> {
        self.targets.iter().find(|target| {
            OrgRepo::from_repository_url(&target.repository_url).ok().as_ref() == Some(org_repo)
        })
    }

    pub fn base_branch_for(&self, org_repo: &OrgRepo) -> Option<&str> {
        self.find(org_repo).map(|target| target.base_branch.as_str())
    }

    /// Repositories in configuration order. Targets whose URL does not parse are skipped;
    /// config validation rejects them before this is reachable.
    pub fn repositories(&self) -> Vec<OrgRepo> {
        self.targets
            .iter()
            .filter_map(|target| OrgRepo::from_repository_url(&target.repository_url).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{NameError, OrgRepo, ReleaseLevel, ReleaseTarget, ReleaseTargets};

    #[test]
    fn parses_repository_urls() {
        let parsed = OrgRepo::from_repository_url("https://github.com/acme/widget").expect("parse");
        assert_eq!(parsed.org(), "acme");
        assert_eq!(parsed.repo(), "widget");
        assert_eq!(parsed.repository_url(), "https://github.com/acme/widget");
        assert_eq!(parsed.pull_request_url(42), "https://github.com/acme/widget/pull/42");

        let with_suffix =
            OrgRepo::from_repository_url("https://github.com/acme/widget.git/").expect("parse");
        assert_eq!(with_suffix.repo(), "widget");
    }

    #[test]
    fn rejects_urls_outside_github_or_with_extra_segments() {
        for url in [
            "https://gitlab.com/acme/widget",
            "https://github.com/acme",
            "https://github.com/acme/widget/tree/main",
            "https://github.com/acme/wid get",
        ] {
            assert!(
                matches!(OrgRepo::from_repository_url(url), Err(NameError::InvalidRepositoryUrl(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn names_containing_the_delimiter_are_rejected() {
        assert!(matches!(
            OrgRepo::new("ac__me", "widget"),
            Err(NameError::InvalidCharacters { field: "org", .. })
        ));
        assert!(matches!(OrgRepo::new("acme", ""), Err(NameError::Empty { field: "repo" })));
    }

    #[test]
    fn names_with_edge_underscores_are_rejected() {
        for (org, repo, field) in [
            ("acme", "widget_", "repo"),
            ("acme", "_widget", "repo"),
            ("acme_", "widget", "org"),
            ("_acme", "widget", "org"),
        ] {
            let rejected = OrgRepo::new(org, repo);
            assert!(
                matches!(rejected, Err(NameError::InvalidCharacters { field: f, .. }) if f == field),
                "{org}/{repo} should be rejected"
            );
        }
        assert!(matches!(
            OrgRepo::from_repository_url("https://github.com/acme/widget_"),
            Err(NameError::InvalidRepositoryUrl(_))
        ));
        assert!(OrgRepo::new("my_org", "my_repo").is_ok());
    }

    #[test]
    fn release_levels_round_trip_through_wire_values() {
        for level in ReleaseLevel::ALL {
            assert_eq!(level.as_str().parse::<ReleaseLevel>(), Ok(level));
        }
        assert!("major".parse::<ReleaseLevel>().is_err());
    }

    #[test]
    fn targets_resolve_base_branch_by_repository() {
        let targets = ReleaseTargets::new(vec![
            ReleaseTarget {
                repository_url: "https://github.com/acme/widget".to_owned(),
                base_branch: "main".to_owned(),
            },
            ReleaseTarget {
                repository_url: "https://github.com/acme/gadget/".to_owned(),
                base_branch: "develop".to_owned(),
            },
        ]);

        let gadget = OrgRepo::new("acme", "gadget").expect("valid");
        let missing = OrgRepo::new("acme", "gizmo").expect("valid");
        assert_eq!(targets.base_branch_for(&gadget), Some("develop"));
        assert_eq!(targets.base_branch_for(&missing), None);
        assert_eq!(targets.repositories().len(), 2);
    }

    #[test]
    fn targets_configured_with_a_git_suffix_are_found() {
        let targets = ReleaseTargets::new(vec![ReleaseTarget {
            repository_url: "https://github.com/acme/widget.git".to_owned(),
            base_branch: "release".to_owned(),
        }]);

        let offered = targets.repositories();
        assert_eq!(offered, vec![OrgRepo::new("acme", "widget").expect("valid")]);
        assert_eq!(
            targets.find(&offered[0]).map(|target| target.repository_url.as_str()),
            Some("https://github.com/acme/widget.git")
        );
        assert_eq!(targets.base_branch_for(&offered[0]), Some("release"));
    }
}
