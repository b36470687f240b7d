//! Engine scenarios driven through the in-memory tmux and VCS fakes.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tmux_vcs_sync_core::{
    testing::{FakeServer, FakeVcs, RepoConfig},
    tmux::{Server, Session},
    vcs::{Repository, VersionControlSystem, VersionControlSystems},
    Error, ExecutionError, RepoName, Result, State, SystemError, ValidationError, WorkUnitName,
};

const VCS: &str = "fake(testing/)";

fn registered(vcs: &FakeVcs) -> VersionControlSystems {
    let mut all = VersionControlSystems::new();
    all.register(Arc::new(vcs.clone()));
    all
}

fn server(pid: u32, sessions: &[(&str, &str)]) -> FakeServer {
    let srv = FakeServer::new(pid);
    for (name, dir) in sessions {
        srv.add_session(name, dir);
    }
    srv
}

async fn repo(all: &VersionControlSystems, dir: &str) -> Result<Arc<dyn Repository>> {
    all.maybe_find_repository(Path::new(dir))
        .await?
        .ok_or_else(|| Error::not_found(dir))
}

fn wu(repo: &str, work_unit: &str) -> WorkUnitName {
    WorkUnitName::new(RepoName::new(VCS, repo), work_unit)
}

fn tmux_sessions(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(name, dir)| ((*name).to_string(), (*dir).to_string()))
        .collect()
}

/// Sorted view of the engine, checked for internal consistency on the way.
#[derive(Debug, Default, PartialEq, Eq)]
struct Simplified {
    work_units: Vec<WorkUnitName>,
    repos: Vec<RepoName>,
    unknown: Vec<String>,
}

async fn simplify(st: &State) -> Simplified {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut work_units = Vec::new();
    for (n, sesh) in st.sessions() {
        let (repo, work_unit) = match st.work_unit(sesh.as_ref()).await {
            Ok(found) => found,
            Err(e) => panic!("session {} for {n} is not indexed: {e}", sesh.id()),
        };
        assert_eq!(WorkUnitName::of(repo.as_ref(), work_unit), n);
        *counts.entry(n.repo().to_string()).or_default() += 1;
        work_units.push(n);
    }
    for (repo, count) in &counts {
        assert_eq!(st.unqualified_repo_count(repo), *count, "count for {repo}");
    }
    for sesh in st.unknown_sessions().values() {
        assert!(st.work_unit(sesh.as_ref()).await.is_err());
    }

    work_units.sort();
    let mut repos: Vec<RepoName> = st.repositories().into_keys().collect();
    repos.sort();
    let mut unknown: Vec<String> = st.unknown_sessions().into_keys().collect();
    unknown.sort();
    Simplified {
        work_units,
        repos,
        unknown,
    }
}

fn simplified(work_units: &[(&str, &str)], unknown: &[&str]) -> Simplified {
    let mut work_units: Vec<WorkUnitName> = work_units.iter().map(|(r, w)| wu(r, w)).collect();
    work_units.sort();
    let mut repos: Vec<RepoName> = work_units.iter().map(|n| n.repo_name.clone()).collect();
    repos.sort();
    repos.dedup();
    let mut unknown: Vec<String> = unknown.iter().map(ToString::to_string).collect();
    unknown.sort();
    Simplified {
        work_units,
        repos,
        unknown,
    }
}

// Construction

#[tokio::test]
async fn new_on_empty_server() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let st = State::new(Arc::new(server(1, &[])), &registered(&vcs)).await?;
    assert_eq!(simplify(&st).await, Simplified::default());
    Ok(())
}

#[tokio::test]
async fn new_single_repo() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let srv = server(1, &[("foo", "testing/repo"), ("bar", "testing/repo")]);
    let st = State::new(Arc::new(srv), &registered(&vcs)).await?;
    assert_eq!(
        simplify(&st).await,
        simplified(&[("repo", "foo"), ("repo", "bar")], &[])
    );
    Ok(())
}

#[tokio::test]
async fn new_with_unknown_sessions() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let srv = server(1, &[("foo", "testing/repo"), ("bar", "someOtherDir")]);
    let st = State::new(Arc::new(srv), &registered(&vcs)).await?;
    assert_eq!(simplify(&st).await, simplified(&[("repo", "foo")], &["bar"]));
    Ok(())
}

#[tokio::test]
async fn new_multiple_repos_accepts_either_naming() -> Result<()> {
    for names in [["foo", "bar"], ["repo1>foo", "repo2>bar"]] {
        let vcs = FakeVcs::new("testing/");
        let srv = server(1, &[(names[0], "testing/repo1"), (names[1], "testing/repo2")]);
        let st = State::new(Arc::new(srv), &registered(&vcs)).await?;
        assert_eq!(
            simplify(&st).await,
            simplified(&[("repo1", "foo"), ("repo2", "bar")], &[]),
            "sessions named {names:?}"
        );
    }
    Ok(())
}

/// Counts a lookup as finished when it is dropped, whether it completed or
/// was cancelled.
struct LookupGuard(Arc<AtomicUsize>);

impl Drop for LookupGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A VCS whose repository lookups never finish in time.
#[derive(Default)]
struct SlowVcs {
    started: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl VersionControlSystem for SlowVcs {
    fn name(&self) -> &str {
        "slow"
    }

    fn work_unit_kind(&self) -> &str {
        "work unit"
    }

    async fn resolve_repository(&self, _dir: &Path) -> Result<Option<Arc<dyn Repository>>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _guard = LookupGuard(Arc::clone(&self.dropped));
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(None)
    }
}

#[tokio::test]
async fn new_timing_out_cancels_every_lookup() {
    let slow = Arc::new(SlowVcs::default());
    let started = Arc::clone(&slow.started);
    let dropped = Arc::clone(&slow.dropped);
    let mut all = VersionControlSystems::new();
    all.register(slow);
    let srv = server(1, &[("foo", "d1"), ("bar", "d2"), ("baz", "d3")]);

    let built = tokio::time::timeout(
        Duration::from_millis(200),
        State::new(Arc::new(srv), &all),
    )
    .await;
    assert!(built.is_err(), "construction should have timed out");

    // Aborted tasks are dropped the next time the runtime gets to them.
    for _ in 0..100 {
        if dropped.load(Ordering::SeqCst) == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(started.load(Ordering::SeqCst), 3);
    assert_eq!(dropped.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn new_skips_directories_claimed_by_several_vcs() -> Result<()> {
    let mut all = VersionControlSystems::new();
    all.register(Arc::new(FakeVcs::new("testing/")));
    all.register(Arc::new(FakeVcs::new("testing/")));
    all.register(Arc::new(FakeVcs::new("other/")));
    let srv = server(1, &[("foo", "testing/repo"), ("bar", "other/repo")]);

    let st = State::new(Arc::new(srv), &all).await?;
    let known: Vec<WorkUnitName> = st.sessions().into_keys().collect();
    assert_eq!(
        known,
        [WorkUnitName::new(RepoName::new("fake(other/)", "repo"), "bar")]
    );
    let unknown: Vec<String> = st.unknown_sessions().into_keys().collect();
    assert_eq!(unknown, ["foo"]);
    Ok(())
}

// NewSession

#[tokio::test]
async fn new_session_on_empty_server() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.new_session(&repo(&all, "testing/repo").await?, "foo").await?;

    assert_eq!(simplify(&st).await, simplified(&[("repo", "foo")], &[]));
    assert_eq!(srv.snapshot(), tmux_sessions(&[("foo", "testing/repo")]));
    Ok(())
}

#[tokio::test]
async fn new_session_in_same_repo_stays_unqualified() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.new_session(&repo(&all, "testing/repo").await?, "bar").await?;

    assert_eq!(
        simplify(&st).await,
        simplified(&[("repo", "foo"), ("repo", "bar")], &[])
    );
    assert_eq!(
        srv.snapshot(),
        tmux_sessions(&[("foo", "testing/repo"), ("bar", "testing/repo")])
    );
    Ok(())
}

#[tokio::test]
async fn new_session_in_second_repo_qualifies_everything() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo1")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.new_session(&repo(&all, "testing/repo2").await?, "bar").await?;

    assert_eq!(
        simplify(&st).await,
        simplified(&[("repo1", "foo"), ("repo2", "bar")], &[])
    );
    assert_eq!(
        srv.snapshot(),
        tmux_sessions(&[("repo1>foo", "testing/repo1"), ("repo2>bar", "testing/repo2")])
    );
    Ok(())
}

#[tokio::test]
async fn new_session_that_already_exists_changes_nothing() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    let err = st.new_session(&repo(&all, "testing/repo").await?, "foo").await.err();

    assert!(matches!(
        err,
        Some(Error::Validation(ValidationError::AlreadyExists(_)))
    ));
    assert_eq!(err.map(|e| e.exit_code()), Some(1));
    assert_eq!(simplify(&st).await, simplified(&[("repo", "foo")], &[]));
    assert_eq!(srv.snapshot(), tmux_sessions(&[("foo", "testing/repo")]));
    Ok(())
}

// RenameSession

#[tokio::test]
async fn rename_simple() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.rename_session(&repo(&all, "testing/repo").await?, "foo", "bar").await?;

    assert_eq!(simplify(&st).await, simplified(&[("repo", "bar")], &[]));
    assert_eq!(srv.snapshot(), tmux_sessions(&[("bar", "testing/repo")]));
    Ok(())
}

#[tokio::test]
async fn rename_across_multiple_repos() -> Result<()> {
    for (names, old) in [(["foo", "bar"], "foo"), (["repo1>foo", "repo2>bar"], "repo1>foo")] {
        let vcs = FakeVcs::new("testing/");
        let all = registered(&vcs);
        let srv = server(1, &[(names[0], "testing/repo1"), (names[1], "testing/repo2")]);
        let mut st = State::new(Arc::new(srv.clone()), &all).await?;

        st.rename_session(&repo(&all, "testing/repo1").await?, old, "baz").await?;

        assert_eq!(
            simplify(&st).await,
            simplified(&[("repo1", "baz"), ("repo2", "bar")], &[])
        );
        assert_eq!(
            srv.snapshot(),
            tmux_sessions(&[("repo1>baz", "testing/repo1"), ("repo2>bar", "testing/repo2")]),
            "renaming {old:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn rename_missing_session_fails() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    let err = st
        .rename_session(&repo(&all, "testing/repo").await?, "bar", "foo")
        .await
        .err();

    assert!(matches!(
        err,
        Some(Error::Validation(ValidationError::DoesNotExist(_)))
    ));
    assert_eq!(simplify(&st).await, simplified(&[("repo", "foo")], &[]));
    assert_eq!(srv.snapshot(), tmux_sessions(&[("foo", "testing/repo")]));
    Ok(())
}

#[tokio::test]
async fn rename_onto_existing_session_fails() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo"), ("bar", "testing/repo")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    let err = st
        .rename_session(&repo(&all, "testing/repo").await?, "foo", "bar")
        .await
        .err();

    assert!(matches!(
        err,
        Some(Error::Validation(ValidationError::AlreadyExists(_)))
    ));
    assert_eq!(
        simplify(&st).await,
        simplified(&[("repo", "foo"), ("repo", "bar")], &[])
    );
    assert_eq!(srv.rename_count(), 0);
    Ok(())
}

// PruneSessions

#[tokio::test]
async fn prune_unqualifies_remaining_sessions() -> Result<()> {
    let vcs = FakeVcs::with_repos("testing/", [RepoConfig::new("repo1").with_children("root", &["foo"])])?;
    let all = registered(&vcs);
    let srv = server(1, &[("repo1>foo", "testing/repo1"), ("repo2>bar", "testing/repo2")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.prune_sessions().await?;

    assert_eq!(simplify(&st).await, simplified(&[("repo1", "foo")], &[]));
    assert_eq!(srv.snapshot(), tmux_sessions(&[("foo", "testing/repo1")]));
    Ok(())
}

#[tokio::test]
async fn prune_kills_current_session_last() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = FakeServer::new(1);
    let a = srv.add_session("a", "testing/repo");
    let b = srv.add_session("b", "testing/repo");
    let c = srv.add_session("c", "testing/repo");
    let keep = srv.add_session("root", "testing/repo");
    srv.set_attached(Some(a.as_str()));
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.prune_sessions().await?;

    assert_eq!(srv.kill_order(), [b, c, a]);
    assert_eq!(srv.session_id("root"), Some(keep));
    assert_eq!(simplify(&st).await, simplified(&[("repo", "root")], &[]));
    Ok(())
}

#[tokio::test]
async fn prune_leaves_unlistable_repos_alone() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    vcs.set_fail_listing("repo2", true);
    let all = registered(&vcs);
    let srv = server(1, &[("repo1>foo", "testing/repo1"), ("repo2>bar", "testing/repo2")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.prune_sessions().await?;

    assert_eq!(simplify(&st).await, simplified(&[("repo2", "bar")], &[]));
    assert_eq!(srv.snapshot(), tmux_sessions(&[("bar", "testing/repo2")]));
    Ok(())
}

#[tokio::test]
async fn prune_ignores_unknown_sessions() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("root", "testing/repo"), ("scratch", "/tmp")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.prune_sessions().await?;

    assert!(srv.kill_order().is_empty());
    assert_eq!(simplify(&st).await, simplified(&[("repo", "root")], &["scratch"]));
    Ok(())
}

#[tokio::test]
async fn prune_after_work_unit_is_deleted() -> Result<()> {
    let vcs = FakeVcs::with_repos("testing/", [RepoConfig::new("repo").with_children("root", &["feature"])])?;
    let all = registered(&vcs);
    let srv = server(1, &[("root", "testing/repo"), ("feature", "testing/repo")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;

    st.prune_sessions().await?;
    assert!(srv.kill_order().is_empty());

    vcs.remove_work_unit("repo", "feature");
    st.prune_sessions().await?;
    assert_eq!(srv.session_names(), ["root"]);
    Ok(())
}

// UpdateSessionNames

#[tokio::test]
async fn update_session_names_is_idempotent() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo1"), ("bar", "testing/repo2")]);
    let st = State::new(Arc::new(srv.clone()), &all).await?;

    st.update_session_names().await?;
    assert_eq!(srv.rename_count(), 2);
    assert_eq!(srv.session_names(), ["repo1>foo", "repo2>bar"]);

    st.update_session_names().await?;
    assert_eq!(srv.rename_count(), 2);
    Ok(())
}

#[tokio::test]
async fn update_session_names_reports_every_failure() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo1"), ("bar", "testing/repo2")]);
    let st = State::new(Arc::new(srv.clone()), &all).await?;
    srv.set_fail_renames(true);

    match st.update_session_names().await {
        Err(Error::Multiple(errs)) => assert_eq!(errs.len(), 2),
        other => panic!("expected two rename failures, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn failed_renames_do_not_fail_mutations() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = server(1, &[("foo", "testing/repo1")]);
    let mut st = State::new(Arc::new(srv.clone()), &all).await?;
    srv.set_fail_renames(true);

    st.new_session(&repo(&all, "testing/repo2").await?, "bar").await?;

    assert_eq!(srv.session_names(), ["foo", "repo2>bar"]);
    assert_eq!(
        simplify(&st).await,
        simplified(&[("repo1", "foo"), ("repo2", "bar")], &[])
    );
    Ok(())
}

// Lookups

#[tokio::test]
async fn work_unit_rejects_foreign_and_untracked_sessions() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = FakeServer::new(1);
    srv.add_session("foo", "testing/repo");
    let scratch = srv.add_session("scratch", "/tmp");
    let st = State::new(Arc::new(srv.clone()), &all).await?;

    let other = FakeServer::new(2);
    let foreign = other.add_session("foo", "testing/repo");
    let err = st.work_unit(other.session(&foreign).as_ref()).await.err();
    assert!(matches!(
        err,
        Some(Error::System(SystemError::DifferentServer { .. }))
    ));

    let err = st.work_unit(srv.session(&scratch).as_ref()).await.err();
    assert!(matches!(
        err,
        Some(Error::Execution(ExecutionError::NotTracked { .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn session_lookup_by_work_unit() -> Result<()> {
    let vcs = FakeVcs::new("testing/");
    let all = registered(&vcs);
    let srv = FakeServer::new(1);
    let id = srv.add_session("foo", "testing/repo");
    let st = State::new(Arc::new(srv.clone()), &all).await?;

    let repo = repo(&all, "testing/repo").await?;
    assert_eq!(st.session(repo.as_ref(), "foo").map(|s| s.id().to_string()), Some(id));
    assert!(st.session(repo.as_ref(), "bar").is_none());
    assert_eq!(st.server().pid().await?, 1);
    Ok(())
}

#[tokio::test]
async fn maybe_find_repository_resolves_partial_names() -> Result<()> {
    let vcs = FakeVcs::with_repos(
        "testing/",
        [
            RepoConfig::new("repo1").with_children("root", &["shared", "only1"]),
            RepoConfig::new("repo2").with_children("root", &["shared"]),
        ],
    )?;
    let all = registered(&vcs);
    let srv = server(1, &[("repo1>root", "testing/repo1"), ("repo2>root", "testing/repo2")]);
    let st = State::new(Arc::new(srv), &all).await?;

    let found = |n: WorkUnitName| {
        let st = &st;
        async move {
            st.maybe_find_repository(&n)
                .await
                .map(|r| r.map(|r| r.name().to_string()))
        }
    };

    let bare = |w: &str| WorkUnitName::new(RepoName::default(), w);
    assert_eq!(found(bare("only1")).await?, Some("repo1".to_string()));
    assert_eq!(found(bare("missing")).await?, None);
    assert_eq!(
        found(WorkUnitName::new(RepoName::new("", "repo2"), "shared")).await?,
        Some("repo2".to_string())
    );
    assert_eq!(found(wu("repo2", "shared")).await?, Some("repo2".to_string()));
    assert_eq!(found(wu("repo3", "shared")).await?, None);

    let err = found(bare("shared")).await.err();
    assert!(matches!(
        err,
        Some(Error::Context { ref source, .. })
            if matches!(**source, Error::Execution(ExecutionError::Ambiguous { .. }))
    ));
    let msg = err.map(|e| e.to_string()).unwrap_or_default();
    assert!(msg.contains("fake(testing/):repo1"), "{msg}");
    assert!(msg.contains("fake(testing/):repo2"), "{msg}");

    let err = found(WorkUnitName::new(RepoName::new(VCS, ""), "shared")).await.err();
    assert!(matches!(
        err,
        Some(Error::Validation(ValidationError::InvalidName(_)))
    ));
    Ok(())
}
