//! `suggest`: work unit names for shell completion of `update`.

use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use tmux_vcs_sync_core::{vcs::Repository, RepoName, Result, State, WorkUnitName};

use super::Context;

pub async fn run(ctx: &Context, prefix: &str) -> Result<()> {
    let names = ctx.bounded(async { Ok(suggestions(ctx, prefix).await) }).await?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Work units of every repository active in tmux, plus the current
/// repository, that start with `prefix`.
///
/// Work units of the current repository are bare; the rest are `repo>wu`.
/// Failures only narrow the result.
pub async fn suggestions(ctx: &Context, prefix: &str) -> Vec<String> {
    let mut repos: HashMap<RepoName, Arc<dyn Repository>> = HashMap::new();
    let (srv, inside) = ctx.terminal.server();
    if inside {
        match State::new(srv, &ctx.vcs).await {
            Ok(st) => repos = st.repositories(),
            Err(e) => tracing::warn!(error = %e, "Could not determine repositories from tmux server."),
        }
    }

    let cur = match ctx.maybe_current_repository().await {
        Ok(cur) => cur.map(|repo| (RepoName::of(repo.as_ref()), repo)),
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current repository.");
            None
        }
    };
    let cur_name = cur.as_ref().map(|(n, _)| n.clone());
    repos.extend(cur);

    let listings = join_all(repos.into_iter().map(|(n, repo)| async move {
        let listing = repo.list("").await;
        (n, repo, listing)
    }))
    .await;

    let mut names = Vec::new();
    for (n, repo, listing) in listings {
        let work_units = match listing {
            Ok(work_units) => work_units,
            Err(e) => {
                tracing::warn!(repo = %n, error = %e, "Could not list work units.");
                continue;
            }
        };
        names.extend(
            work_units
                .into_iter()
                .map(|wu| {
                    if cur_name.as_ref() == Some(&n) {
                        wu
                    } else {
                        WorkUnitName::of(repo.as_ref(), wu).repo_string()
                    }
                })
                .filter(|name| name.starts_with(prefix)),
        );
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use tmux_vcs_sync_core::testing::{FakeServer, FakeVcs, RepoConfig};

    use super::*;
    use crate::commands::fixtures;

    fn two_repos() -> Result<FakeVcs> {
        FakeVcs::with_repos(
            "testing/",
            [
                RepoConfig::new("repo1").with_children("root", &["foo"]),
                RepoConfig::new("repo2").with_children("root", &["bar"]),
            ],
        )
    }

    fn attached_server() -> FakeServer {
        let srv = FakeServer::new(1);
        let id = srv.add_session("repo1>root", "testing/repo1");
        srv.add_session("repo2>root", "testing/repo2");
        srv.set_attached(Some(id.as_str()));
        srv
    }

    #[tokio::test]
    async fn test_current_repository_is_unqualified() -> Result<()> {
        let vcs = two_repos()?;
        let (ctx, _) = fixtures::context(&vcs, &attached_server(), "testing/repo1");

        assert_eq!(
            suggestions(&ctx, "").await,
            ["foo", "repo2>bar", "repo2>root", "root"]
        );
        assert_eq!(suggestions(&ctx, "repo2>b").await, ["repo2>bar"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_outside_tmux_only_current_repository() -> Result<()> {
        let vcs = two_repos()?;
        let srv = FakeServer::new(1);
        srv.add_session("repo2>root", "testing/repo2");
        let (ctx, _) = fixtures::context(&vcs, &srv, "testing/repo1");

        assert_eq!(suggestions(&ctx, "").await, ["foo", "root"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_outside_any_repository() -> Result<()> {
        let vcs = two_repos()?;
        let (ctx, _) = fixtures::context(&vcs, &attached_server(), "elsewhere");

        assert_eq!(
            suggestions(&ctx, "").await,
            ["repo1>foo", "repo1>root", "repo2>bar", "repo2>root"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unlistable_repository_is_skipped() -> Result<()> {
        let vcs = two_repos()?;
        vcs.set_fail_listing("repo2", true);
        let (ctx, _) = fixtures::context(&vcs, &attached_server(), "testing/repo1");

        assert_eq!(suggestions(&ctx, "").await, ["foo", "root"]);
        Ok(())
    }
}
