//! Session naming.
//!
//! A tmux session for a work unit is named either `work_unit` or
//! `repo>work_unit`, depending on how many repositories are active. These
//! types are the structured identities behind those strings.

use std::fmt;

use crate::vcs::Repository;

/// Separator between the parts of a session name.
pub const SEPARATOR: char = '>';

/// Identifies a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoName {
    pub vcs: String,
    pub repo: String,
}

impl RepoName {
    pub fn new(vcs: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            vcs: vcs.into(),
            repo: repo.into(),
        }
    }

    /// The name a repository reports for itself.
    pub fn of(repo: &dyn Repository) -> Self {
        Self::new(repo.vcs().name(), repo.name())
    }

    pub fn is_empty(&self) -> bool {
        self.vcs.is_empty() && self.repo.is_empty()
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vcs.is_empty() {
            write!(f, "{}", self.repo)
        } else {
            write!(f, "{}{SEPARATOR}{}", self.vcs, self.repo)
        }
    }
}

/// Identifies a work unit within a repository.
///
/// The repository fields may be empty when the name came from user input
/// and has not been resolved yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkUnitName {
    pub repo_name: RepoName,
    pub work_unit: String,
}

impl WorkUnitName {
    pub fn new(repo_name: RepoName, work_unit: impl Into<String>) -> Self {
        Self {
            repo_name,
            work_unit: work_unit.into(),
        }
    }

    pub fn of(repo: &dyn Repository, work_unit: impl Into<String>) -> Self {
        Self::new(RepoName::of(repo), work_unit)
    }

    pub fn vcs(&self) -> &str {
        &self.repo_name.vcs
    }

    pub fn repo(&self) -> &str {
        &self.repo_name.repo
    }

    /// `repo>work_unit`
    pub fn repo_string(&self) -> String {
        format!("{}{SEPARATOR}{}", self.repo_name.repo, self.work_unit)
    }

    /// `work_unit`
    pub fn work_unit_string(&self) -> &str {
        &self.work_unit
    }
}

impl fmt::Display for WorkUnitName {
    /// The most qualified form whose parts are known.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.repo_name.vcs.is_empty() {
            write!(
                f,
                "{}{SEPARATOR}{}{SEPARATOR}{}",
                self.repo_name.vcs, self.repo_name.repo, self.work_unit
            )
        } else if !self.repo_name.repo.is_empty() {
            write!(f, "{}", self.repo_string())
        } else {
            write!(f, "{}", self.work_unit)
        }
    }
}

/// Parse a session name (or user input) with no repository to check it
/// against. Parts that are not present are left empty.
///
/// `wu`, `repo>wu` and `vcs>repo>wu` are recognized. Anything after the
/// second separator belongs to the work unit.
pub fn parse_session_name_without_known_repository(name: &str) -> WorkUnitName {
    let parts: Vec<&str> = name.splitn(3, SEPARATOR).collect();
    match parts.as_slice() {
        [vcs, repo, work_unit] => WorkUnitName::new(RepoName::new(*vcs, *repo), *work_unit),
        [repo, work_unit] => WorkUnitName::new(RepoName::new("", *repo), *work_unit),
        _ => WorkUnitName::new(RepoName::default(), name),
    }
}

/// Parse a tmux session name that is known to belong to `repo`.
///
/// The repository identity always comes from `repo`. If the name claims a
/// different repository, that is logged and otherwise ignored.
pub fn parse_session_name(repo: &dyn Repository, name: &str) -> WorkUnitName {
    let mut parsed = parse_session_name_without_known_repository(name);
    let actual = RepoName::of(repo);
    let vcs_disagrees = !parsed.repo_name.vcs.is_empty() && parsed.repo_name.vcs != actual.vcs;
    let repo_disagrees = !parsed.repo_name.repo.is_empty() && parsed.repo_name.repo != actual.repo;
    if vcs_disagrees || repo_disagrees {
        tracing::warn!(session_name = name, repo = %actual, "Session name does not agree with repository.");
    }
    parsed.repo_name = actual;
    parsed
}
