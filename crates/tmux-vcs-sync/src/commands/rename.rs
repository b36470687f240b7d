//! `rename`: rename the current work unit and its session together.

use tmux_vcs_sync_core::{tmux::SessionProperty, Result, ResultExt, State};

use super::Context;

pub async fn run(ctx: &Context, new_name: &str) -> Result<()> {
    ctx.bounded(async {
        let repo = ctx.current_repository().await?;
        let sesh = ctx.current_session()?;
        let mut st = State::new(sesh.server(), &ctx.vcs).await?;
        let old_name = sesh.property(SessionProperty::Name).await?;

        // An existing session for new_name makes rename_session fail, so
        // leave the work unit alone in that case.
        if st.session(repo.as_ref(), new_name).is_none() {
            repo.rename(new_name).await.with_context(|| {
                format!(
                    "could not rename {} {old_name:?} to {new_name:?}",
                    repo.vcs().work_unit_kind()
                )
            })?;
        }
        st.rename_session(&repo, &old_name, new_name).await
    })
    .await
}
