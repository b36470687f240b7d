use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    vcs::{Repository, VersionControlSystem},
    Error, Result,
};

/// Every fake repository starts out with this work unit checked out.
pub const DEFAULT_WORK_UNIT: &str = "root";

/// Seed data for one fake repository: its name and a parent → children
/// map of work units below [`DEFAULT_WORK_UNIT`].
#[derive(Debug, Clone, Default)]
pub struct RepoConfig {
    pub name: String,
    pub work_units: BTreeMap<String, Vec<String>>,
}

impl RepoConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            work_units: BTreeMap::new(),
        }
    }

    pub fn with_children(mut self, parent: &str, children: &[&str]) -> Self {
        self.work_units
            .entry(parent.to_string())
            .or_default()
            .extend(children.iter().map(ToString::to_string));
        self
    }
}

#[derive(Debug)]
struct RepoState {
    current: String,
    // work unit -> parent; roots map to "".
    parents: HashMap<String, String>,
    fail_listing: bool,
}

impl RepoState {
    fn new() -> Self {
        Self {
            current: DEFAULT_WORK_UNIT.to_string(),
            parents: HashMap::from([(DEFAULT_WORK_UNIT.to_string(), String::new())]),
            fail_listing: false,
        }
    }

    fn commit(&mut self, name: &str, parent: &str) -> Result<()> {
        if self.parents.contains_key(name) {
            return Err(Error::already_exists(format!("work unit {name:?}")));
        }
        if !self.parents.contains_key(parent) {
            return Err(Error::does_not_exist(format!("parent work unit {parent:?}")));
        }
        self.parents.insert(name.to_string(), parent.to_string());
        Ok(())
    }

    fn switch_to(&mut self, name: &str) -> Result<()> {
        if !self.parents.contains_key(name) {
            return Err(Error::does_not_exist(format!("work unit {name:?}")));
        }
        self.current = name.to_string();
        Ok(())
    }

    fn rename_current(&mut self, name: &str) -> Result<()> {
        if self.parents.contains_key(name) {
            return Err(Error::already_exists(format!("work unit {name:?}")));
        }
        let old = std::mem::replace(&mut self.current, name.to_string());
        let parent = self.parents.remove(&old).unwrap_or_default();
        self.parents.insert(name.to_string(), parent);
        for p in self.parents.values_mut() {
            if *p == old {
                *p = name.to_string();
            }
        }
        Ok(())
    }

    /// Topological order, breaking ties with the smallest name.
    fn topological_order(&self) -> Vec<String> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut ready: BTreeSet<&str> = BTreeSet::new();
        for (wu, parent) in &self.parents {
            if parent.is_empty() {
                ready.insert(wu);
            } else {
                children.entry(parent).or_default().push(wu);
            }
        }
        let mut order = Vec::with_capacity(self.parents.len());
        while let Some(next) = ready.pop_first() {
            order.push(next.to_string());
            if let Some(kids) = children.get(next) {
                ready.extend(kids.iter().copied());
            }
        }
        order
    }
}

#[derive(Debug, Default)]
struct VcsState {
    repos: HashMap<PathBuf, RepoState>,
}

/// A VCS that claims every directory under a prefix.
///
/// The repository in `<prefix>/foo` is named `foo`. Clones share state, so
/// a test can keep one handle and inspect what the engine did.
#[derive(Debug, Clone)]
pub struct FakeVcs {
    name: String,
    prefix: PathBuf,
    state: Arc<Mutex<VcsState>>,
}

impl FakeVcs {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            name: format!("fake({})", prefix.display()),
            prefix,
            state: Arc::default(),
        }
    }

    /// Create repositories up front.
    ///
    /// # Errors
    ///
    /// Returns an error if a config names a parent that does not exist by
    /// the time it is added, or repeats a work unit.
    pub fn with_repos(
        prefix: impl Into<PathBuf>,
        repos: impl IntoIterator<Item = RepoConfig>,
    ) -> Result<Self> {
        let vcs = Self::new(prefix);
        {
            let mut st = vcs.lock();
            for cfg in repos {
                let repo = st.repos.entry(vcs.prefix.join(&cfg.name)).or_insert_with(RepoState::new);
                let mut pending: Vec<(String, Vec<String>)> = cfg.work_units.into_iter().collect();
                // Parents may themselves be children of a later entry.
                while !pending.is_empty() {
                    let before = pending.len();
                    let mut deferred = Vec::new();
                    for (parent, kids) in pending {
                        if repo.parents.contains_key(&parent) {
                            for kid in &kids {
                                repo.commit(kid, &parent)?;
                            }
                        } else {
                            deferred.push((parent, kids));
                        }
                    }
                    if deferred.len() == before {
                        let missing = deferred.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>();
                        return Err(Error::does_not_exist(format!(
                            "parent work units {missing:?} in {}",
                            cfg.name
                        )));
                    }
                    pending = deferred;
                }
            }
        }
        Ok(vcs)
    }

    /// The directory of the repository called `name`.
    pub fn repo_dir(&self, name: &str) -> PathBuf {
        self.prefix.join(name)
    }

    /// Make `list` fail for the repository called `name`.
    pub fn set_fail_listing(&self, name: &str, fail: bool) {
        let dir = self.repo_dir(name);
        self.lock()
            .repos
            .entry(dir)
            .or_insert_with(RepoState::new)
            .fail_listing = fail;
    }

    /// Delete a work unit out from under any session that represents it.
    /// Its children are reparented to its parent.
    pub fn remove_work_unit(&self, repo: &str, work_unit: &str) {
        let mut st = self.lock();
        let Some(repo) = st.repos.get_mut(&self.repo_dir(repo)) else {
            return;
        };
        let Some(parent) = repo.parents.remove(work_unit) else {
            return;
        };
        for p in repo.parents.values_mut() {
            if p == work_unit {
                p.clone_from(&parent);
            }
        }
        if repo.current == work_unit {
            repo.current = if parent.is_empty() { DEFAULT_WORK_UNIT.to_string() } else { parent };
        }
    }

    /// The current work unit of the repository called `name`, if it exists.
    pub fn current(&self, name: &str) -> Option<String> {
        self.lock()
            .repos
            .get(&self.repo_dir(name))
            .map(|repo| repo.current.clone())
    }

    fn lock(&self) -> MutexGuard<'_, VcsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl VersionControlSystem for FakeVcs {
    fn name(&self) -> &str {
        &self.name
    }

    fn work_unit_kind(&self) -> &str {
        "work unit"
    }

    async fn resolve_repository(&self, dir: &Path) -> Result<Option<Arc<dyn Repository>>> {
        if !dir.starts_with(&self.prefix) || dir == self.prefix {
            return Ok(None);
        }
        let Some(name) = dir.file_name() else {
            return Ok(None);
        };
        self.lock()
            .repos
            .entry(dir.to_path_buf())
            .or_insert_with(RepoState::new);
        Ok(Some(Arc::new(FakeRepository {
            vcs: self.clone(),
            name: name.to_string_lossy().into_owned(),
            dir: dir.to_path_buf(),
        })))
    }
}

#[derive(Debug, Clone)]
pub struct FakeRepository {
    vcs: FakeVcs,
    name: String,
    dir: PathBuf,
}

impl FakeRepository {
    fn with_state<T>(&self, f: impl FnOnce(&mut RepoState) -> Result<T>) -> Result<T> {
        let mut st = self.vcs.lock();
        let repo = st.repos.entry(self.dir.clone()).or_insert_with(RepoState::new);
        f(repo)
    }
}

#[async_trait::async_trait]
impl Repository for FakeRepository {
    fn vcs(&self) -> Arc<dyn VersionControlSystem> {
        Arc::new(self.vcs.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn root_dir(&self) -> &Path {
        &self.dir
    }

    async fn current(&self) -> Result<String> {
        self.with_state(|repo| Ok(repo.current.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_state(|repo| {
            if repo.fail_listing {
                return Err(Error::io_error(format!("could not list {}", self.name)));
            }
            let mut names: Vec<String> = repo
                .parents
                .keys()
                .filter(|wu| wu.starts_with(prefix))
                .cloned()
                .collect();
            names.sort();
            Ok(names)
        })
    }

    async fn sort(&self, work_units: &mut [String]) -> Result<()> {
        let order = self.with_state(|repo| {
            if let Some(unknown) = work_units.iter().find(|wu| !repo.parents.contains_key(*wu)) {
                return Err(Error::does_not_exist(format!("work unit {unknown:?}")));
            }
            Ok(repo.topological_order())
        })?;
        let wanted: BTreeSet<String> = work_units.iter().cloned().collect();
        let sorted = order.into_iter().filter(|wu| wanted.contains(wu));
        for (slot, wu) in work_units.iter_mut().zip(sorted) {
            *slot = wu;
        }
        Ok(())
    }

    async fn create_from_trunk(&self, name: &str) -> Result<()> {
        self.with_state(|repo| {
            repo.commit(name, DEFAULT_WORK_UNIT)?;
            repo.switch_to(name)
        })
    }

    async fn create_from_current(&self, name: &str) -> Result<()> {
        self.with_state(|repo| {
            let parent = repo.current.clone();
            repo.commit(name, &parent)?;
            repo.switch_to(name)
        })
    }

    async fn rename(&self, name: &str) -> Result<()> {
        self.with_state(|repo| repo.rename_current(name))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.with_state(|repo| Ok(repo.parents.contains_key(name)))
    }

    async fn switch_to(&self, name: &str) -> Result<()> {
        self.with_state(|repo| repo.switch_to(name))
    }
}
