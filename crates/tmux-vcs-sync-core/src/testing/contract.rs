//! Behavior every [`Repository`] backend must share.
//!
//! [`repository_contract`] drives a backend through creating, committing,
//! renaming, switching, listing and sorting work units and reports every
//! deviation. The engine's own tests run against [`super::FakeVcs`], so the
//! same checks run against the fake and each real backend.

use std::{fmt, future::Future, sync::Arc};

use crate::{vcs::Repository, Result};

/// Backend-specific leeway and extra cases.
#[derive(Debug, Clone, Default)]
pub struct ContractOptions {
    /// Renaming a work unit to its own name may succeed.
    pub noop_rename_is_ok: bool,
    /// Extra work units created before checking `list`.
    pub extra_list_names: Vec<String>,
    /// Extra `(prefix, expected work units)` pairs for `list`.
    pub extra_list_prefixes: Vec<(String, Vec<String>)>,
}

/// Run the shared checks and return one message per violation.
///
/// `ctor` is called once per case with a name unique to that case and must
/// yield a fresh repository whose current work unit is its trunk. Nothing is
/// assumed about what the trunk is called.
pub async fn repository_contract<F, Fut>(ctor: F, opts: &ContractOptions) -> Vec<String>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Arc<dyn Repository>>>,
{
    let mut r = Report::default();

    if let Some(repo) = r.fresh(&ctor, "empty-repository").await {
        empty_repository(&mut r, repo.as_ref()).await;
    }
    if let Some(repo) = r.fresh(&ctor, "new").await {
        create_from_trunk(&mut r, repo.as_ref()).await;
    }
    if let Some(repo) = r.fresh(&ctor, "commit").await {
        create_from_current(&mut r, repo.as_ref()).await;
    }
    for case in RENAMES {
        let label = format!("rename-{}", case.label);
        if let Some(repo) = r.fresh(&ctor, &label).await {
            rename(&mut r, repo.as_ref(), case, opts).await;
        }
    }
    for case in SWITCHES {
        let label = format!("update-{}", case.label);
        if let Some(repo) = r.fresh(&ctor, &label).await {
            switch_to(&mut r, repo.as_ref(), case).await;
        }
    }
    if let Some(repo) = r.fresh(&ctor, "list").await {
        list(&mut r, repo.as_ref(), opts).await;
    }
    if let Some(repo) = r.fresh(&ctor, "sort").await {
        sort(&mut r, repo.as_ref()).await;
    }
    r.failures
}

#[derive(Default)]
struct Report {
    case: String,
    failures: Vec<String>,
}

impl Report {
    async fn fresh<F, Fut>(&mut self, ctor: &F, case: &str) -> Option<Arc<dyn Repository>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Arc<dyn Repository>>>,
    {
        self.case = case.to_string();
        let repo = ctor(case.to_string()).await;
        self.check("create repository", repo)
    }

    fn fail(&mut self, msg: impl fmt::Display) {
        self.failures.push(format!("[{}] {msg}", self.case));
    }

    fn check<T>(&mut self, what: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail(format_args!("{what}: {e}"));
                None
            }
        }
    }

    fn expect_err<T: fmt::Debug>(&mut self, what: &str, result: Result<T>) {
        if let Ok(value) = result {
            self.fail(format_args!("{what} = {value:?}, want an error"));
        }
    }

    async fn exists(&mut self, repo: &dyn Repository, names: &[&str]) {
        for name in names {
            let found = repo.exists(name).await;
            if self.check(&format!("exists({name:?})"), found) == Some(false) {
                self.fail(format_args!("work unit {name:?} does not exist"));
            }
        }
    }

    async fn not_exists(&mut self, repo: &dyn Repository, name: &str) {
        let found = repo.exists(name).await;
        if self.check(&format!("exists({name:?})"), found) == Some(true) {
            self.fail(format_args!("work unit {name:?} still exists"));
        }
    }

    async fn current_is(&mut self, repo: &dyn Repository, want: &str) {
        let cur = repo.current().await;
        if let Some(cur) = self.check("current()", cur) {
            if cur != want {
                self.fail(format_args!("current() = {cur:?}, want {want:?}"));
            }
        }
    }

    async fn trunk(&mut self, repo: &dyn Repository) -> Option<String> {
        let cur = repo.current().await;
        self.check("current()", cur)
    }

    async fn create(&mut self, repo: &dyn Repository, names: &[&str]) {
        for name in names {
            let created = repo.create_from_trunk(name).await;
            self.check(&format!("create_from_trunk({name:?})"), created);
        }
    }
}

async fn empty_repository(r: &mut Report, repo: &dyn Repository) {
    let Some(cur) = r.trunk(repo).await else {
        return;
    };
    if cur.is_empty() {
        r.fail("a new repository has no current work unit");
        return;
    }
    r.exists(repo, &[cur.as_str()]).await;
}

async fn create_from_trunk(r: &mut Report, repo: &dyn Repository) {
    r.create(repo, &["abcd"]).await;
    r.exists(repo, &["abcd"]).await;
    r.current_is(repo, "abcd").await;
    let again = repo.create_from_trunk("abcd").await;
    r.expect_err("create_from_trunk(\"abcd\") again", again);
}

async fn create_from_current(r: &mut Report, repo: &dyn Repository) {
    r.create(repo, &["abcd1"]).await;
    r.current_is(repo, "abcd1").await;
    let committed = repo.create_from_current("abcd2").await;
    r.check("create_from_current(\"abcd2\")", committed);
    r.exists(repo, &["abcd1", "abcd2"]).await;
    r.current_is(repo, "abcd2").await;
}

struct RenameCase {
    label: &'static str,
    work_units: &'static [&'static str],
    new_name: &'static str,
}

const RENAMES: &[RenameCase] = &[
    RenameCase {
        label: "simple",
        work_units: &["abcd"],
        new_name: "efgh",
    },
    RenameCase {
        label: "noop",
        work_units: &["abcd"],
        new_name: "abcd",
    },
    RenameCase {
        label: "duplicate",
        work_units: &["abcd", "efgh"],
        new_name: "abcd",
    },
];

async fn rename(r: &mut Report, repo: &dyn Repository, case: &RenameCase, opts: &ContractOptions) {
    r.create(repo, case.work_units).await;
    let Some(&last) = case.work_units.last() else {
        return;
    };
    let renamed = repo.rename(case.new_name).await;
    let want_err = if last == case.new_name {
        !opts.noop_rename_is_ok
    } else {
        case.work_units.contains(&case.new_name)
    };
    let what = format!("rename({:?})", case.new_name);
    if want_err {
        r.expect_err(&what, renamed);
        return;
    }
    if r.check(&what, renamed).is_none() {
        return;
    }
    if last != case.new_name {
        r.not_exists(repo, last).await;
    }
    r.exists(repo, &[case.new_name]).await;
    r.current_is(repo, case.new_name).await;
}

struct SwitchCase {
    label: &'static str,
    work_units: &'static [&'static str],
    // `None` switches back to the trunk.
    target: Option<&'static str>,
    want_err: bool,
}

const SWITCHES: &[SwitchCase] = &[
    SwitchCase {
        label: "simple",
        work_units: &["abcd", "efgh"],
        target: Some("abcd"),
        want_err: false,
    },
    SwitchCase {
        label: "to-trunk",
        work_units: &["efgh"],
        target: None,
        want_err: false,
    },
    SwitchCase {
        label: "does-not-exist",
        work_units: &["efgh"],
        target: Some("abcd"),
        want_err: true,
    },
];

async fn switch_to(r: &mut Report, repo: &dyn Repository, case: &SwitchCase) {
    let Some(trunk) = r.trunk(repo).await else {
        return;
    };
    let target = case.target.map_or(trunk, String::from);
    r.create(repo, case.work_units).await;
    r.exists(repo, case.work_units).await;

    let switched = repo.switch_to(&target).await;
    let what = format!("switch_to({target:?})");
    if case.want_err {
        r.expect_err(&what, switched);
    } else if r.check(&what, switched).is_some() {
        r.current_is(repo, &target).await;
    }
    r.exists(repo, case.work_units).await;
}

async fn list(r: &mut Report, repo: &dyn Repository, opts: &ContractOptions) {
    let Some(trunk) = r.trunk(repo).await else {
        return;
    };
    let mut names: Vec<String> = ["abcd1", "abcd2", "efgh"].map(String::from).to_vec();
    names.extend(opts.extra_list_names.iter().cloned());
    for name in &names {
        let created = repo.create_from_trunk(name).await;
        r.check(&format!("create_from_trunk({name:?})"), created);
    }

    let mut everything = names;
    everything.push(trunk);
    let mut cases = vec![
        (String::new(), everything),
        ("abcd".to_string(), vec!["abcd1".to_string(), "abcd2".to_string()]),
        ("nothingStartsWithThisPrefix".to_string(), Vec::new()),
    ];
    cases.extend(opts.extra_list_prefixes.iter().cloned());

    for (prefix, mut want) in cases {
        let listed = repo.list(&prefix).await;
        let Some(mut got) = r.check(&format!("list({prefix:?})"), listed) else {
            continue;
        };
        got.sort();
        want.sort();
        if got != want {
            r.fail(format_args!("list({prefix:?}) = {got:?}, want {want:?}"));
        }
    }
}

// trunk
// ├── abcd
// │   ├── abcd1
// │   └── abcd2
// └── efgh
//     └── efgh1
//         └── efgh2
async fn sort(r: &mut Report, repo: &dyn Repository) {
    let Some(trunk) = r.trunk(repo).await else {
        return;
    };
    let tree: [(&str, &[&str]); 4] = [
        (trunk.as_str(), &["abcd", "efgh"]),
        ("abcd", &["abcd1", "abcd2"]),
        ("efgh", &["efgh1"]),
        ("efgh1", &["efgh2"]),
    ];
    for (parent, children) in tree {
        for child in children {
            let switched = repo.switch_to(parent).await;
            r.check(&format!("switch_to({parent:?})"), switched);
            let committed = repo.create_from_current(child).await;
            r.check(&format!("create_from_current({child:?})"), committed);
        }
    }

    let cases: [(&str, Vec<&str>); 4] = [
        ("linked-list", vec![trunk.as_str(), "abcd", "abcd1"]),
        ("partial-linked-list", vec!["efgh", "efgh2"]),
        ("topologically-equivalent", vec!["abcd1", "abcd2"]),
        ("empty", Vec::new()),
    ];
    for (label, want) in cases {
        let mut got: Vec<String> = want.iter().rev().map(ToString::to_string).collect();
        let sorted = repo.sort(&mut got).await;
        if r.check(&format!("sort {label}"), sorted).is_some() && got != want {
            r.fail(format_args!("sort {label} = {got:?}, want {want:?}"));
        }
    }

    let mut unknown = vec!["wxyz".to_string()];
    let sorted = repo.sort(&mut unknown).await;
    r.expect_err("sort([\"wxyz\"])", sorted);
}
