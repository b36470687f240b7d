//! Reconciliation engine between tmux sessions and VCS work units.
//!
//! A [`State`] is built from one snapshot of a tmux server and keeps a
//! two-way index between session ids and `(repository, work unit)` pairs.
//! Every mutation goes through tmux (and, where relevant, the repository)
//! first and only then updates the index, so a failed operation leaves the
//! index untouched.
//!
//! Session display names follow one rule ([`State::session_name`]): once
//! sessions from more than one repository exist, every session name is
//! qualified with its repository.

pub mod name;

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Arc,
};

use futures::future::join_all;
use tokio::task::JoinSet;

pub use self::name::{
    parse_session_name, parse_session_name_without_known_repository, RepoName, WorkUnitName,
};
use crate::{
    tmux::{self, NewSessionOptions, Server, Session, SessionProperty, Sessions},
    vcs::{self, Repository, VersionControlSystems},
    Error, ExecutionError, Result, ResultExt, SystemError,
};

#[derive(Clone)]
struct WorkUnit {
    repo: Arc<dyn Repository>,
    work_unit: String,
}

pub struct State {
    server: Arc<dyn Server>,

    // Sessions on `server` that belong to a known repository.
    sessions_by_name: HashMap<WorkUnitName, Arc<dyn Session>>,
    sessions_by_id: HashMap<String, WorkUnit>,
    // Live session count per unqualified repo name.
    unqualified_repos: HashMap<String, usize>,
    // One representative handle per repository.
    repos: HashMap<RepoName, Arc<dyn Repository>>,

    unknown_sessions: HashMap<String, Arc<dyn Session>>,
}

impl State {
    fn empty(server: Arc<dyn Server>) -> Self {
        Self {
            server,
            sessions_by_name: HashMap::new(),
            sessions_by_id: HashMap::new(),
            unqualified_repos: HashMap::new(),
            repos: HashMap::new(),
            unknown_sessions: HashMap::new(),
        }
    }

    /// Index every session on `server`.
    ///
    /// Sessions are grouped by working directory and each directory is
    /// checked once, concurrently, against every VCS. A directory whose
    /// lookup fails is treated like one without a repository. Dropping the
    /// returned future cancels every outstanding lookup.
    ///
    /// # Errors
    ///
    /// Returns an error only if tmux itself cannot be queried.
    pub async fn new(server: Arc<dyn Server>, vcs: &VersionControlSystems) -> Result<Self> {
        let sessions = server.list_sessions().await?;
        let mut st = Self::empty(server);
        if sessions.is_empty() {
            return Ok(st);
        }

        let props = sessions
            .properties(&[SessionProperty::Name, SessionProperty::Path])
            .await
            .context("could not resolve session properties")?;

        // Sessions created by this tool are rooted at the repository's root
        // directory, so many of them share a path.
        let mut by_path: HashMap<String, Vec<Arc<dyn Session>>> = HashMap::new();
        for sesh in sessions {
            let Some(path) = props.get(sesh.id()).map(|p| prop(p, SessionProperty::Path)) else {
                tracing::debug!(session_id = sesh.id(), "Session disappeared while listing.");
                continue;
            };
            by_path.entry(path).or_default().push(sesh);
        }

        let mut lookups = JoinSet::new();
        for (path, sessions) in by_path {
            let vcs = vcs.clone();
            lookups.spawn(async move {
                let repo = discover_repository(&vcs, &path).await;
                (sessions, repo)
            });
        }

        while let Some(joined) = lookups.join_next().await {
            let (sessions, repo) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "Repository lookup did not complete.");
                    continue;
                }
            };
            for sesh in sessions {
                let name = props
                    .get(sesh.id())
                    .map(|p| prop(p, SessionProperty::Name))
                    .unwrap_or_default();
                st.index_discovered(sesh, name, repo.as_ref());
            }
        }
        Ok(st)
    }

    fn index_discovered(
        &mut self,
        sesh: Arc<dyn Session>,
        session_name: String,
        repo: Option<&Arc<dyn Repository>>,
    ) {
        let Some(repo) = repo else {
            tracing::info!(session_id = sesh.id(), session_name = %session_name, "Not a repository.");
            self.unknown_sessions.insert(session_name, sesh);
            return;
        };

        let parsed = parse_session_name(repo.as_ref(), &session_name);
        if let Some(existing) = self.sessions_by_name.get(&parsed) {
            tracing::warn!(
                session_id = sesh.id(),
                existing_id = existing.id(),
                name = %parsed,
                "Work unit already has a session; treating this one as unknown."
            );
            self.unknown_sessions.insert(session_name, sesh);
            return;
        }

        tracing::info!(session_id = sesh.id(), session_name = %session_name, name = %parsed, "Found work unit in tmux session.");
        self.insert(parsed, sesh, Arc::clone(repo));
    }

    fn insert(&mut self, name: WorkUnitName, sesh: Arc<dyn Session>, repo: Arc<dyn Repository>) {
        *self
            .unqualified_repos
            .entry(name.repo().to_string())
            .or_default() += 1;
        self.repos
            .entry(name.repo_name.clone())
            .or_insert_with(|| Arc::clone(&repo));
        self.sessions_by_id.insert(
            sesh.id().to_string(),
            WorkUnit {
                repo,
                work_unit: name.work_unit.clone(),
            },
        );
        self.sessions_by_name.insert(name, sesh);
    }

    fn remove(&mut self, name: &WorkUnitName) -> Option<Arc<dyn Session>> {
        let sesh = self.sessions_by_name.remove(name)?;
        self.sessions_by_id.remove(sesh.id());
        if let Some(count) = self.unqualified_repos.get_mut(name.repo()) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.unqualified_repos.remove(name.repo());
            }
        }
        if !self.sessions_by_name.keys().any(|n| n.repo_name == name.repo_name) {
            self.repos.remove(&name.repo_name);
        }
        Some(sesh)
    }

    /// The tmux session name this state would use for `n` right now.
    pub fn session_name(&self, n: &WorkUnitName) -> String {
        let active = self.unqualified_repos.len();
        if active > 1 || (active == 1 && !self.unqualified_repos.contains_key(n.repo())) {
            n.repo_string()
        } else {
            n.work_unit_string().to_string()
        }
    }

    pub fn server(&self) -> Arc<dyn Server> {
        Arc::clone(&self.server)
    }

    /// All sessions that represent a work unit.
    pub fn sessions(&self) -> HashMap<WorkUnitName, Arc<dyn Session>> {
        self.sessions_by_name.clone()
    }

    /// Sessions that don't represent a work unit, keyed by session name.
    pub fn unknown_sessions(&self) -> HashMap<String, Arc<dyn Session>> {
        self.unknown_sessions.clone()
    }

    /// A representative repository handle for each active repository.
    pub fn repositories(&self) -> HashMap<RepoName, Arc<dyn Repository>> {
        self.repos.clone()
    }

    /// Number of sessions whose repository is called `repo`, across VCSes.
    pub fn unqualified_repo_count(&self, repo: &str) -> usize {
        self.unqualified_repos.get(repo).copied().unwrap_or(0)
    }

    /// The work unit `sesh` represents.
    ///
    /// # Errors
    ///
    /// Returns `SystemError::DifferentServer` if `sesh` is not on this
    /// state's server and `ExecutionError::NotTracked` if it does not
    /// represent a work unit.
    pub async fn work_unit(&self, sesh: &dyn Session) -> Result<(Arc<dyn Repository>, String)> {
        if !tmux::same_server(sesh.server().as_ref(), self.server.as_ref()).await {
            return Err(SystemError::DifferentServer {
                session_id: sesh.id().to_string(),
            }
            .into());
        }
        self.sessions_by_id
            .get(sesh.id())
            .map(|wu| (Arc::clone(&wu.repo), wu.work_unit.clone()))
            .ok_or_else(|| {
                ExecutionError::NotTracked {
                    session_id: sesh.id().to_string(),
                }
                .into()
            })
    }

    /// The session for a work unit, if there is one.
    pub fn session(&self, repo: &dyn Repository, work_unit: &str) -> Option<Arc<dyn Session>> {
        let n = WorkUnitName::of(repo, work_unit);
        let sesh = self.sessions_by_name.get(&n).cloned();
        if let Some(sesh) = &sesh {
            tracing::info!(session_id = sesh.id(), name = %n, "Found existing tmux session for work unit.");
        }
        sesh
    }

    /// Create a session for a work unit.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::AlreadyExists` without touching tmux if the
    /// work unit already has a session, or the tmux error if creating the
    /// session fails.
    pub async fn new_session(
        &mut self,
        repo: &Arc<dyn Repository>,
        work_unit: &str,
    ) -> Result<Arc<dyn Session>> {
        let name = WorkUnitName::of(repo.as_ref(), work_unit);
        let session_name = self.session_name(&name);
        if self.sessions_by_name.contains_key(&name) {
            return Err(Error::already_exists(format!("tmux session {session_name:?}")));
        }

        tracing::info!(name = %name, session_name = %session_name, "Creating tmux session.");
        let sesh = self
            .server
            .new_session(NewSessionOptions {
                name: Some(session_name.clone()),
                start_dir: Some(repo.root_dir().to_path_buf()),
            })
            .await
            .with_context(|| format!("failed to create tmux session {session_name:?}"))?;

        self.insert(name, Arc::clone(&sesh), Arc::clone(repo));
        self.fix_session_names().await;
        Ok(sesh)
    }

    /// Make the session for work unit `old` represent work unit `new`.
    ///
    /// `old` is parsed as a session name, so it may be qualified.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DoesNotExist` if `old` has no session,
    /// `ValidationError::AlreadyExists` if `new` already has one, or the tmux
    /// error if renaming the session fails.
    pub async fn rename_session(
        &mut self,
        repo: &Arc<dyn Repository>,
        old: &str,
        new: &str,
    ) -> Result<()> {
        let old_name = parse_session_name(repo.as_ref(), old);
        let Some(sesh) = self.sessions_by_name.get(&old_name).cloned() else {
            return Err(Error::does_not_exist(format!(
                "tmux session {:?}",
                self.session_name(&old_name)
            )));
        };
        let new_name = WorkUnitName::of(repo.as_ref(), new);
        if self.sessions_by_name.contains_key(&new_name) {
            return Err(Error::already_exists(format!(
                "tmux session {:?}",
                self.session_name(&new_name)
            )));
        }

        sesh.rename(&self.session_name(&new_name)).await?;

        self.remove(&old_name);
        self.insert(new_name, sesh, Arc::clone(repo));
        self.fix_session_names().await;
        Ok(())
    }

    /// Kill every session whose work unit no longer exists.
    ///
    /// Repositories that cannot be listed are left alone. The session this
    /// process runs in is killed last so that the rest of the work gets done
    /// first.
    ///
    /// # Errors
    ///
    /// Returns the first error from killing a session. Sessions killed
    /// before it stay killed.
    pub async fn prune_sessions(&mut self) -> Result<()> {
        let listings = join_all(
            self.repos
                .iter()
                .map(|(n, repo)| async move { (n.clone(), repo.list("").await) }),
        )
        .await;

        let mut valid: HashSet<WorkUnitName> = HashSet::new();
        let mut errored: HashSet<RepoName> = HashSet::new();
        for (n, listing) in listings {
            match listing {
                Ok(work_units) => {
                    valid.extend(work_units.into_iter().map(|wu| WorkUnitName::new(n.clone(), wu)));
                }
                Err(e) => {
                    tracing::warn!(repo = %n, error = %e, "Could not list work units for repository.");
                    errored.insert(n);
                }
            }
        }

        let mut to_remove: Vec<(WorkUnitName, Arc<dyn Session>)> = self
            .sessions_by_name
            .iter()
            .filter(|(n, _)| !errored.contains(&n.repo_name) && !valid.contains(*n))
            .map(|(n, sesh)| (n.clone(), Arc::clone(sesh)))
            .collect();
        to_remove.sort_by(|a, b| a.0.cmp(&b.0));

        if let Some(current) = self.server.current_session() {
            let mut flagged = Vec::with_capacity(to_remove.len());
            for (n, sesh) in to_remove {
                let is_current = tmux::same_session(current.as_ref(), sesh.as_ref()).await;
                flagged.push((n, sesh, is_current));
            }
            // Stable, so the rest keep their order.
            flagged.sort_by_key(|(_, _, is_current)| *is_current);
            to_remove = flagged.into_iter().map(|(n, sesh, _)| (n, sesh)).collect();
        }

        for (n, sesh) in to_remove {
            tracing::warn!(session_id = sesh.id(), name = %n, "Killing session.");
            sesh.kill().await?;
            self.remove(&n);
        }

        self.fix_session_names().await;
        Ok(())
    }

    async fn fix_session_names(&self) {
        if let Err(e) = self.update_session_names().await {
            tracing::warn!(error = %e, "Failed to update tmux session names.");
        }
    }

    /// Rename every indexed session whose name disagrees with
    /// [`Self::session_name`].
    ///
    /// # Errors
    ///
    /// Returns every failed rename joined together; one failure does not
    /// stop the others.
    pub async fn update_session_names(&self) -> Result<()> {
        if self.sessions_by_name.is_empty() {
            return Ok(());
        }
        let known = Sessions::new(
            Arc::clone(&self.server),
            self.sessions_by_name.values().cloned().collect(),
        );
        let names = known
            .property(SessionProperty::Name)
            .await
            .context("could not resolve session names")?;

        let mut errs = Vec::new();
        for (n, sesh) in &self.sessions_by_name {
            let want = self.session_name(n);
            let got = names.get(sesh.id());
            if got.map(String::as_str) == Some(want.as_str()) {
                continue;
            }
            tracing::debug!(session_id = sesh.id(), from = ?got, to = %want, "Renaming session.");
            if let Err(e) = sesh.rename(&want).await {
                errs.push(e);
            }
        }
        Error::join(errs).map_or(Ok(()), Err)
    }

    /// Find the active repository that has work unit `n`.
    ///
    /// `n` may leave its VCS, or both its VCS and repo, empty; every active
    /// repository matching the parts that are set is asked whether the work
    /// unit exists.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Ambiguous` naming every match if more than
    /// one repository has the work unit, and `ValidationError::InvalidName`
    /// if `n` names a VCS but no repo.
    pub async fn maybe_find_repository(
        &self,
        n: &WorkUnitName,
    ) -> Result<Option<Arc<dyn Repository>>> {
        let mut candidates: Vec<(&RepoName, &Arc<dyn Repository>)> = if !n.vcs().is_empty() {
            if n.repo().is_empty() {
                return Err(Error::invalid_name(format!(
                    "{n} has a VCS but no repository"
                )));
            }
            match self.repos.get_key_value(&n.repo_name) {
                Some(entry) => vec![entry],
                None => return Ok(None),
            }
        } else if !n.repo().is_empty() {
            self.repos.iter().filter(|(m, _)| m.repo == n.repo()).collect()
        } else {
            self.repos.iter().collect()
        };
        candidates.sort_by(|a, b| a.0.cmp(b.0));

        let checks = candidates.into_iter().map(|(_, repo)| async move {
            match repo.exists(&n.work_unit).await {
                Ok(true) => Ok(Some(Arc::clone(repo))),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            }
        });
        vcs::find_unique_repository(join_all(checks).await)
            .with_context(|| format!("work unit {n}"))
    }
}

fn prop(props: &tmux::SessionProperties, key: SessionProperty) -> String {
    props.get(&key).cloned().unwrap_or_default()
}

async fn discover_repository(vcs: &VersionControlSystems, path: &str) -> Option<Arc<dyn Repository>> {
    if path.is_empty() {
        return None;
    }
    tracing::debug!(directory = path, "Checking for repository in directory.");
    match vcs.maybe_find_repository(Path::new(path)).await {
        Ok(repo) => repo,
        Err(e) => {
            tracing::warn!(directory = path, error = %e, "Error while checking for repository in directory.");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeServer, FakeVcs};

    fn registered(vcs: FakeVcs) -> VersionControlSystems {
        let mut all = VersionControlSystems::new();
        all.register(Arc::new(vcs));
        all
    }

    /// The two indexes agree and the per-repo counts are exact.
    fn assert_consistent(st: &State) {
        assert_eq!(st.sessions_by_name.len(), st.sessions_by_id.len());
        for (n, sesh) in &st.sessions_by_name {
            let wu = &st.sessions_by_id[sesh.id()];
            assert_eq!(&WorkUnitName::of(wu.repo.as_ref(), wu.work_unit.as_str()), n);
            assert!(st.repos.contains_key(&n.repo_name), "{n} has no repository");
        }
        let mut counts: HashMap<String, usize> = HashMap::new();
        for n in st.sessions_by_name.keys() {
            *counts.entry(n.repo().to_string()).or_default() += 1;
        }
        assert_eq!(counts, st.unqualified_repos);
        for sesh in st.unknown_sessions.values() {
            assert!(!st.sessions_by_id.contains_key(sesh.id()));
        }
    }

    #[tokio::test]
    async fn test_session_name_policy() -> Result<()> {
        let srv = FakeServer::new(1);
        srv.add_session("foo", "testing/repo1");
        let st = State::new(Arc::new(srv), &registered(FakeVcs::new("testing/"))).await?;
        assert_consistent(&st);

        let vcs = "fake(testing/)";
        let same = WorkUnitName::new(RepoName::new(vcs, "repo1"), "bar");
        let other = WorkUnitName::new(RepoName::new(vcs, "repo2"), "bar");
        assert_eq!(st.session_name(&same), "bar");
        assert_eq!(st.session_name(&other), "repo2>bar");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_state_never_qualifies() -> Result<()> {
        let st = State::new(Arc::new(FakeServer::new(1)), &registered(FakeVcs::new("testing/"))).await?;
        let n = WorkUnitName::new(RepoName::new("fake(testing/)", "repo"), "foo");
        assert_eq!(st.session_name(&n), "foo");
        assert!(st.sessions().is_empty());
        assert!(st.repositories().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_work_unit_sessions_are_unknown() -> Result<()> {
        let srv = FakeServer::new(1);
        srv.add_session("foo", "testing/repo");
        srv.add_session("repo>foo", "testing/repo");
        let st = State::new(Arc::new(srv), &registered(FakeVcs::new("testing/"))).await?;
        assert_consistent(&st);
        assert_eq!(st.sessions().len(), 1);
        assert_eq!(st.unknown_sessions().len(), 1);
        assert_eq!(st.unqualified_repo_count("repo"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sessions_without_a_path_are_unknown() -> Result<()> {
        let srv = FakeServer::new(1);
        srv.add_session("scratch", "");
        let st = State::new(Arc::new(srv), &registered(FakeVcs::new("testing/"))).await?;
        assert_eq!(st.unknown_sessions().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_failures_do_not_abort_construction() -> Result<()> {
        let srv = FakeServer::new(1);
        srv.add_session("foo", "testing/repo");
        srv.add_session("bar", "elsewhere");
        // No VCS registered: every lookup fails.
        let st = State::new(Arc::new(srv), &VersionControlSystems::new()).await?;
        assert!(st.sessions().is_empty());
        assert_eq!(st.unknown_sessions().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_index_stays_consistent_through_mutations() -> Result<()> {
        let srv = FakeServer::new(1);
        srv.add_session("foo", "testing/repo1");
        let vcs = FakeVcs::new("testing/");
        let all = registered(vcs.clone());
        let mut st = State::new(Arc::new(srv.clone()), &all).await?;

        let Some(repo2) = all.maybe_find_repository(Path::new("testing/repo2")).await? else {
            panic!("no repo2");
        };
        repo2.create_from_trunk("bar").await?;
        st.new_session(&repo2, "bar").await?;
        assert_consistent(&st);

        st.rename_session(&repo2, "bar", "baz").await?;
        assert_consistent(&st);

        st.prune_sessions().await?;
        assert_consistent(&st);
        // repo1 has no "foo" work unit and repo2 has no "baz".
        assert!(st.sessions().is_empty());
        assert!(st.repositories().is_empty());
        assert_eq!(srv.session_names(), Vec::<String>::new());
        Ok(())
    }
}
