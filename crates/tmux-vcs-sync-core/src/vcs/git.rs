//! git backend: work units are local branches.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use itertools::Itertools;
use regex::Regex;

use super::{Repository, VersionControlSystem};
use crate::{
    exec::{Executable, Invocation},
    Error, ExecutionError, Result,
};

/// git config key that overrides the discovered repository name.
pub const NAME_CONFIG_KEY: &str = "tmux-vcs-sync.name";

#[derive(Debug, Clone)]
pub struct Git {
    git: Executable,
}

impl Git {
    pub const fn new(git: Executable) -> Self {
        Self { git }
    }

    /// # Errors
    ///
    /// Returns `SystemError::CommandNotFound` if `binary` is not on `$PATH`.
    pub fn lookup(binary: &str) -> Result<Self> {
        Executable::lookup(binary).map(Self::new)
    }
}

#[async_trait::async_trait]
impl VersionControlSystem for Git {
    fn name(&self) -> &str {
        "git"
    }

    fn work_unit_kind(&self) -> &str {
        "branch"
    }

    async fn resolve_repository(&self, dir: &Path) -> Result<Option<Arc<dyn Repository>>> {
        let dir = dir.to_string_lossy();
        let out = self
            .git
            .invoke(["-C", dir.as_ref(), "rev-parse", "--show-toplevel"])
            .output()
            .await?;
        if !out.success() {
            return Ok(None);
        }
        let mut repo = GitRepository {
            git: self.clone(),
            root: PathBuf::from(out.stdout.trim_end()),
            name: String::new(),
        };
        repo.name = repo.discover_name().await;
        Ok(Some(Arc::new(repo)))
    }
}

pub struct GitRepository {
    git: Git,
    root: PathBuf,
    name: String,
}

/// Extract `NAME` from a GitHub remote URL
/// (`git@github.com:owner/NAME.git` or `https://github.com/owner/NAME.git`).
pub fn repo_name_from_url(url: &str) -> Option<String> {
    static SSH: OnceLock<Option<Regex>> = OnceLock::new();
    static HTTPS: OnceLock<Option<Regex>> = OnceLock::new();
    let ssh = SSH.get_or_init(|| Regex::new(r"^git@github\.com:[^/]+/(.+)\.git$").ok());
    let https = HTTPS.get_or_init(|| Regex::new(r"^https://github\.com/[^/]+/(.+)\.git$").ok());

    [ssh, https]
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(url.trim()))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

impl GitRepository {
    fn command<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.git.git.invoke(args).current_dir(&self.root)
    }

    async fn discover_name(&self) -> String {
        if let Ok(Some(name)) = self.config_value(NAME_CONFIG_KEY).await {
            if !name.is_empty() {
                return name;
            }
        }
        if let Some(name) = self.origin_name().await {
            return name;
        }
        self.root
            .file_name()
            .map(|base| base.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    async fn origin_name(&self) -> Option<String> {
        let out = self
            .command(["remote", "get-url", "origin"])
            .output()
            .await
            .ok()?;
        if !out.success() {
            if !out.stderr.contains("No such remote") {
                tracing::warn!(repo = %self.root.display(), stderr = out.stderr.trim(), "Could not read origin URL.");
            }
            return None;
        }
        repo_name_from_url(&out.stdout)
    }

    /// `Ok(None)` when the key is unset.
    async fn config_value(&self, key: &str) -> Result<Option<String>> {
        let invocation = self.command(["config", key]);
        let out = invocation.clone().output().await?;
        if out.success() {
            return Ok(Some(out.stdout.trim_end().to_string()));
        }
        if out.stderr.trim().is_empty() {
            return Ok(None);
        }
        Err(invocation.failure(out.exit_code, &out.stderr))
    }

    /// The branch new work units are based on.
    async fn trunk(&self) -> Result<String> {
        let preferred = match self.config_value("init.defaultBranch").await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Could not determine init.defaultBranch preference.");
                None
            }
        };
        let candidates = preferred
            .into_iter()
            .chain(["main".to_string(), "master".to_string()])
            .unique();
        for candidate in candidates {
            if self.exists(&candidate).await? {
                tracing::debug!(name = %candidate, "Found default branch name.");
                return Ok(candidate);
            }
        }
        Err(Error::not_found("could not determine default branch"))
    }

    async fn branches_by_hash(&self, branches: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let args = ["branch", "--list", "--format=%(refname:short) %(objectname)"]
            .into_iter()
            .map(String::from)
            .chain(branches.iter().cloned());
        let stdout = self.command(args).stdout().await.map_err(|e| e.context("could not get branch hashes"))?;
        let mut by_hash: HashMap<String, Vec<String>> = HashMap::new();
        for line in stdout.lines().filter(|l| !l.is_empty()) {
            if let Some((branch, hash)) = line.rsplit_once(' ') {
                by_hash.entry(hash.to_string()).or_default().push(branch.to_string());
            }
        }
        Ok(by_hash)
    }
}

#[async_trait::async_trait]
impl Repository for GitRepository {
    fn vcs(&self) -> Arc<dyn VersionControlSystem> {
        Arc::new(self.git.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn root_dir(&self) -> &Path {
        &self.root
    }

    async fn current(&self) -> Result<String> {
        let current = self.command(["rev-parse", "--abbrev-ref", "HEAD"]).stdout().await?;
        if current == "HEAD" {
            return Err(ExecutionError::UnstableRepository {
                work_unit_kind: self.git.work_unit_kind().to_string(),
            }
            .into());
        }
        Ok(current)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut args = vec!["branch".to_string(), "--format=%(refname:short)".to_string(), "--list".to_string()];
        if !prefix.is_empty() {
            args.push(format!("{prefix}*"));
        }
        let stdout = self.command(args).stdout().await?;
        Ok(stdout.lines().filter(|l| !l.is_empty()).map(String::from).collect())
    }

    async fn sort(&self, work_units: &mut [String]) -> Result<()> {
        let total = work_units.len();
        if total == 0 {
            return Ok(());
        }
        let by_hash = self.branches_by_hash(work_units).await?;
        tracing::debug!(hashes = ?by_hash, "Found hashes for branches.");

        // rev-list breaks ties by command line order, and the output is
        // reversed, so pass the branches in reverse order.
        let mut revs = work_units.to_vec();
        revs.sort_by(|a, b| b.cmp(a));
        let args = ["rev-list", "--topo-order", "--reverse"]
            .into_iter()
            .map(String::from)
            .chain(revs);
        let mut stream = self.command(args).spawn_stdout()?;

        let mut sorted = Vec::with_capacity(total);
        while sorted.len() < total {
            let Some(hash) = stream.next_line().await? else {
                break;
            };
            if let Some(branches) = by_hash.get(hash.trim()) {
                sorted.extend(branches.iter().cloned());
            }
        }

        if sorted.len() < total {
            // rev-list reached the end of its output. It usually failed on
            // a name that is not a branch.
            if let Err(e) = stream.finish().await {
                tracing::warn!(error = %e, "rev-list failed.");
            }
            let missing = work_units
                .iter()
                .filter(|wu| !sorted.contains(*wu))
                .cloned()
                .collect();
            return Err(ExecutionError::Unsortable {
                sorted: sorted.len(),
                total,
                missing,
            }
            .into());
        }
        if let Err(e) = stream.cancel().await {
            tracing::warn!(error = %e, "Problem stopping rev-list early.");
        }
        sorted.truncate(total);

        match self.trunk().await {
            Ok(trunk) => sorted.sort_by_key(|branch| *branch != trunk),
            Err(e) => tracing::warn!(error = %e, "Not moving the default branch first."),
        }
        work_units.clone_from_slice(&sorted);
        Ok(())
    }

    async fn create_from_trunk(&self, name: &str) -> Result<()> {
        let trunk = self.trunk().await?;
        self.command(["checkout", "-b", name, trunk.as_str()]).run().await
    }

    async fn create_from_current(&self, name: &str) -> Result<()> {
        self.command(["checkout", "-b", name]).run().await
    }

    async fn rename(&self, name: &str) -> Result<()> {
        self.command(["branch", "-m", name]).run().await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let reference = format!("refs/heads/{name}");
        let out = self
            .command(["show-ref", "--verify", "--quiet", reference.as_str()])
            .output()
            .await?;
        Ok(out.success())
    }

    async fn switch_to(&self, name: &str) -> Result<()> {
        self.command(["checkout", name]).run().await
    }
}
