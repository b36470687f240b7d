//! `update`: point tmux and a repository at the same work unit.
//!
//! 1. Inside tmux with no name, the repository follows the session.
//! 2. Outside tmux with no name, the session follows the repository.
//! 3. With a name, both follow the name. The work unit may live in any
//!    repository that is active in tmux.

use std::sync::Arc;

use tmux_vcs_sync_core::{
    state::{parse_session_name, parse_session_name_without_known_repository},
    tmux::{self, Session, SessionProperty},
    vcs::Repository,
    Error, Result, ResultExt, State, WorkUnitName,
};

use super::{session_for, Context};

enum Step {
    /// Attach or switch to this session.
    Attach(Arc<dyn Session>),
    /// Something changed and nothing is left to do.
    Done,
    Noop,
}

/// Returns whether anything changed.
pub async fn run(ctx: &Context, name: Option<&str>) -> Result<bool> {
    let step = ctx
        .bounded(async {
            match name {
                None => plan_current(ctx).await,
                Some(name) => {
                    plan_named(ctx, &parse_session_name_without_known_repository(name)).await
                }
            }
        })
        .await?;

    match step {
        Step::Attach(sesh) => {
            sesh.server().attach_or_switch(sesh.as_ref()).await?;
            Ok(true)
        }
        Step::Done => Ok(true),
        Step::Noop => {
            tracing::info!("No update needed.");
            Ok(false)
        }
    }
}

async fn current_work_unit(repo: &dyn Repository) -> Result<String> {
    repo.current()
        .await
        .with_context(|| format!("couldn't check repo's current {}", repo.vcs().work_unit_kind()))
}

async fn plan_current(ctx: &Context) -> Result<Step> {
    let repo = ctx.current_repository().await?;
    let cur = current_work_unit(repo.as_ref()).await?;
    let (srv, inside) = ctx.terminal.server();
    let sesh = if inside { srv.current_session() } else { None };

    let Some(sesh) = sesh else {
        let mut st = State::new(srv, &ctx.vcs).await?;
        return Ok(Step::Attach(session_for(&mut st, &repo, &cur).await?));
    };

    let name = sesh.property(SessionProperty::Name).await?;
    let want = parse_session_name(repo.as_ref(), &name);
    if cur == want.work_unit {
        return Ok(Step::Noop);
    }
    tracing::info!(current = %cur, want = %want.work_unit, "Updating repository.");
    repo.switch_to(&want.work_unit).await?;
    Ok(Step::Done)
}

async fn plan_named(ctx: &Context, n: &WorkUnitName) -> Result<Step> {
    let (srv, inside) = ctx.terminal.server();
    let mut st = State::new(srv, &ctx.vcs).await?;
    let repo = find_repository(ctx, &st, n).await?;

    let mut changed = false;
    let cur = current_work_unit(repo.as_ref()).await?;
    if cur != n.work_unit {
        tracing::info!(current = %cur, want = %n.work_unit, "Updating repository.");
        repo.switch_to(&n.work_unit).await?;
        changed = true;
    }

    let needs_switch = match (inside, st.session(repo.as_ref(), &n.work_unit)) {
        (true, Some(sesh)) => match st.server().current_session() {
            Some(cur) => !tmux::same_session(cur.as_ref(), sesh.as_ref()).await,
            None => true,
        },
        _ => true,
    };
    if needs_switch {
        return Ok(Step::Attach(session_for(&mut st, &repo, &n.work_unit).await?));
    }
    Ok(if changed { Step::Done } else { Step::Noop })
}

/// The repository `n` refers to.
///
/// An unqualified name prefers the current repository if it has the work
/// unit; otherwise every repository active in tmux is asked.
async fn find_repository(
    ctx: &Context,
    st: &State,
    n: &WorkUnitName,
) -> Result<Arc<dyn Repository>> {
    let mut current_err = None;
    if n.repo_name.is_empty() {
        match exists_in_current_repository(ctx, &n.work_unit).await {
            Ok(Some(repo)) => return Ok(repo),
            Ok(None) => {}
            Err(e) => current_err = Some(e),
        }
    }

    let repo = match st.maybe_find_repository(n).await {
        Ok(Some(repo)) => repo,
        Ok(None) => {
            return Err(joined(
                current_err,
                Error::not_found(format!("could not find repository for {n}")),
            ))
        }
        Err(e) => return Err(joined(current_err, e)),
    };
    if let Some(e) = current_err {
        tracing::warn!(error = %e, "An error occurred with the current repository.");
    }
    tracing::info!(
        name = %WorkUnitName::of(repo.as_ref(), n.work_unit.as_str()),
        "Found repository for requested work unit."
    );
    Ok(repo)
}

async fn exists_in_current_repository(
    ctx: &Context,
    work_unit: &str,
) -> Result<Option<Arc<dyn Repository>>> {
    let Some(repo) = ctx.maybe_current_repository().await? else {
        return Ok(None);
    };
    Ok(repo.exists(work_unit).await?.then_some(repo))
}

fn joined(first: Option<Error>, second: Error) -> Error {
    match first {
        Some(first) => Error::Multiple(vec![first, second]),
        None => second,
    }
}
