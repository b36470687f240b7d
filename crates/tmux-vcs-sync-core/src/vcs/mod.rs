//! Version control collaborator contract.
//!
//! A [`VersionControlSystem`] recognizes repositories of one flavor; a
//! [`Repository`] manages the work units (e.g. branches) inside one of them.
//! The engine only ever talks to these traits.

pub mod git;
pub mod traced;

use std::{fmt, path::Path, sync::Arc};

use futures::future::join_all;
use itertools::Itertools;

use crate::{Error, ExecutionError, Result};

/// A tool that tracks changes to files over time, e.g. git.
#[async_trait::async_trait]
pub trait VersionControlSystem: Send + Sync {
    /// Name of the VCS, e.g. `git`.
    fn name(&self) -> &str;

    /// Human-friendly name for work units, e.g. `branch`.
    fn work_unit_kind(&self) -> &str;

    /// Determine whether a repository of this kind exists at `dir`.
    ///
    /// `Ok(None)` means "no repository here". An error means the lookup
    /// itself failed and says nothing about whether a repository exists.
    async fn resolve_repository(&self, dir: &Path) -> Result<Option<Arc<dyn Repository>>>;
}

/// A particular instance of a [`VersionControlSystem`] over some directory tree.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// The VCS that owns this repository.
    fn vcs(&self) -> Arc<dyn VersionControlSystem>;

    /// Name of the repository, e.g. `tmux-vcs-sync`.
    fn name(&self) -> &str;

    fn root_dir(&self) -> &Path;

    /// Name of the current work unit.
    async fn current(&self) -> Result<String>;

    /// All work units whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Reorder `work_units` topologically, parents first.
    ///
    /// Fails if any of them is unknown to the repository.
    async fn sort(&self, work_units: &mut [String]) -> Result<()>;

    /// Create a work unit on top of the repository's trunk and switch to it.
    async fn create_from_trunk(&self, name: &str) -> Result<()>;

    /// Create a work unit on top of the current one and switch to it.
    async fn create_from_current(&self, name: &str) -> Result<()>;

    /// Rename the current work unit.
    async fn rename(&self, name: &str) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Make `name` the active work unit, e.g. check out the branch.
    async fn switch_to(&self, name: &str) -> Result<()>;
}

/// `vcs:repo`, as used in ambiguity errors and logs.
pub fn display_repository(repo: &dyn Repository) -> String {
    format!("{}:{}", repo.vcs().name(), repo.name())
}

/// Pick the single repository out of a set of lookup results.
///
/// - Exactly one repository: return it. Errors from the other lookups are
///   logged.
/// - No repository: return the joined lookup errors, or `Ok(None)` if there
///   were none.
/// - More than one: an ambiguity error naming every match.
///
/// # Errors
///
/// See above.
pub fn find_unique_repository<I>(results: I) -> Result<Option<Arc<dyn Repository>>>
where
    I: IntoIterator<Item = Result<Option<Arc<dyn Repository>>>>,
{
    let mut repos = Vec::new();
    let mut errs = Vec::new();
    for result in results {
        match result {
            Ok(Some(repo)) => repos.push(repo),
            Ok(None) => {}
            Err(e) => errs.push(e),
        }
    }

    if repos.is_empty() {
        return Error::join(errs).map_or(Ok(None), Err);
    }
    if let Some(err) = Error::join(errs) {
        tracing::warn!(error = %err, "Some errors occurred.");
    }
    if repos.len() == 1 {
        return Ok(repos.pop());
    }
    Err(Error::ambiguous(
        repos.iter().map(|r| display_repository(r.as_ref())).collect(),
    ))
}

/// The ordered set of version control systems this process knows about.
#[derive(Clone, Default)]
pub struct VersionControlSystems {
    all: Vec<Arc<dyn VersionControlSystem>>,
}

impl fmt::Debug for VersionControlSystems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.all.iter().map(|vcs| vcs.name()))
            .finish()
    }
}

impl VersionControlSystems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a VCS. Every repository it yields is wrapped for tracing.
    pub fn register(&mut self, vcs: Arc<dyn VersionControlSystem>) {
        tracing::debug!(vcs = vcs.name(), "Registered VCS.");
        self.all.push(Arc::new(traced::TracedVcs::new(vcs)));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn VersionControlSystem>> {
        self.all.iter()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Find the repository rooted at or containing `dir`, probing every VCS
    /// concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if no VCS is registered, if more than one VCS claims
    /// `dir`, or if no VCS claims it and at least one lookup failed.
    pub async fn maybe_find_repository(&self, dir: &Path) -> Result<Option<Arc<dyn Repository>>> {
        if self.all.is_empty() {
            return Err(ExecutionError::NoRegisteredVcs.into());
        }
        let lookups = self.all.iter().map(|vcs| vcs.resolve_repository(dir));
        find_unique_repository(join_all(lookups).await)
            .map_err(|e| e.context(format!("dir {}", dir.display())))
    }

    /// Like [`Self::maybe_find_repository`], logging what was found.
    ///
    /// # Errors
    ///
    /// See [`Self::maybe_find_repository`].
    pub async fn maybe_repository_at(&self, dir: &Path) -> Result<Option<Arc<dyn Repository>>> {
        let repo = self.maybe_find_repository(dir).await?;
        if let Some(repo) = &repo {
            tracing::info!(
                vcs = repo.vcs().name(),
                repo = repo.name(),
                directory = %dir.display(),
                "Discovered repository."
            );
        }
        Ok(repo)
    }

    /// The repository at `dir`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::NotFound` if no repository claims `dir`,
    /// plus the errors of [`Self::maybe_find_repository`].
    pub async fn repository_at(&self, dir: &Path) -> Result<Arc<dyn Repository>> {
        self.maybe_repository_at(dir).await?.ok_or_else(|| {
            Error::not_found(format!(
                "no Repository exists in {} (registered VCS: {})",
                dir.display(),
                self.all.iter().map(|vcs| vcs.name()).join(", ")
            ))
        })
    }

    /// [`Self::maybe_repository_at`] the working directory.
    ///
    /// # Errors
    ///
    /// See [`Self::maybe_find_repository`].
    pub async fn maybe_current_repository(&self) -> Result<Option<Arc<dyn Repository>>> {
        self.maybe_repository_at(&working_dir()?).await
    }

    /// [`Self::repository_at`] the working directory.
    ///
    /// # Errors
    ///
    /// See [`Self::repository_at`].
    pub async fn current_repository(&self) -> Result<Arc<dyn Repository>> {
        self.repository_at(&working_dir()?).await
    }
}

fn working_dir() -> Result<std::path::PathBuf> {
    std::env::current_dir()
        .map_err(|e| Error::io_error(format!("could not get working directory: {e}")))
}
