//! `new` and `commit`: create a work unit and a session for it.

use std::sync::Arc;

use tmux_vcs_sync_core::{Result, ResultExt, State};

use super::Context;

/// What a new work unit is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    /// The repository's trunk (`new`).
    Trunk,
    /// The current work unit (`commit`).
    Current,
}

/// Create work unit `name` in the current repository, a session for it,
/// and attach to that session.
///
/// If a session for `name` already exists the work unit is left alone and
/// the session creation reports the conflict.
pub async fn run(ctx: &Context, name: &str, base: Base) -> Result<()> {
    let (srv, sesh) = ctx
        .bounded(async {
            let repo = ctx.current_repository().await?;
            let (srv, _) = ctx.terminal.server();
            let mut st = State::new(Arc::clone(&srv), &ctx.vcs).await?;
            if st.session(repo.as_ref(), name).is_none() {
                tracing::info!(work_unit = name, ?base, "Creating work unit.");
                let created = match base {
                    Base::Trunk => repo.create_from_trunk(name).await,
                    Base::Current => repo.create_from_current(name).await,
                };
                created.with_context(|| {
                    format!("failed to create {} {name:?}", repo.vcs().work_unit_kind())
                })?;
            }
            let sesh = st.new_session(&repo, name).await?;
            Ok((srv, sesh))
        })
        .await?;

    srv.attach_or_switch(sesh.as_ref())
        .await
        .with_context(|| format!("failed to attach to newly created session {:?}", sesh.id()))
}
