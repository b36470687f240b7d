//! `cleanup`: kill sessions whose work units are gone.

use tmux_vcs_sync_core::{Result, State};

use super::Context;

pub async fn run(ctx: &Context) -> Result<()> {
    ctx.bounded(async {
        let (srv, _) = ctx.terminal.server();
        let mut st = State::new(srv, &ctx.vcs).await?;
        st.prune_sessions().await
    })
    .await
}
