//! Command implementations.
//!
//! Every command runs against a [`Context`], which bundles the registered
//! VCSes, a way to reach tmux and the directory the command was started in.
//! Reconciliation work runs under the configured deadline; attaching to a
//! session and showing a menu wait on the user and do not.

pub mod cleanup;
pub mod completions;
pub mod display_menu;
pub mod new;
pub mod rename;
pub mod suggest;
pub mod update;

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use tmux_vcs_sync_core::{
    config::TmuxConfig,
    exec::Executable,
    tmux::{Client, Server, ServerOptions, Session, TmuxClient, TmuxServer},
    vcs::{git::Git, Repository, VersionControlSystems},
    Config, Error, ExecutionError, Result, State, SystemError,
};

/// How commands reach tmux.
pub trait Terminal: Send + Sync {
    /// The server this process runs inside of, or the configured default
    /// server. The flag reports whether we are inside tmux.
    fn server(&self) -> (Arc<dyn Server>, bool);

    /// The client this process runs in.
    fn client(&self) -> Result<Arc<dyn Client>>;
}

/// The `tmux` binary on `$PATH`.
pub struct SystemTerminal {
    tmux: Executable,
    opts: ServerOptions,
}

impl SystemTerminal {
    /// # Errors
    ///
    /// Returns `SystemError::CommandNotFound` if the tmux binary is missing.
    pub fn new(cfg: &TmuxConfig) -> Result<Self> {
        let mut opts = ServerOptions::default();
        if let Some(name) = &cfg.socket_name {
            opts = opts.socket_name(name.clone());
        }
        if let Some(file) = &cfg.config_file {
            opts = opts.config_file(file.clone());
        }
        Ok(Self {
            tmux: Executable::lookup(&cfg.binary)?,
            opts,
        })
    }
}

impl Terminal for SystemTerminal {
    fn server(&self) -> (Arc<dyn Server>, bool) {
        let (srv, inside) = TmuxServer::current_or(self.tmux.clone(), self.opts.clone());
        (Arc::new(srv), inside)
    }

    fn client(&self) -> Result<Arc<dyn Client>> {
        Ok(Arc::new(TmuxClient::current(self.tmux.clone())?))
    }
}

pub struct Context {
    pub vcs: VersionControlSystems,
    pub terminal: Arc<dyn Terminal>,
    pub work_dir: PathBuf,
    pub deadline: Duration,
}

impl Context {
    /// Wire up the real collaborators described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if tmux cannot be found or the working directory is
    /// unreadable. A missing git binary only disables the git backend.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut vcs = VersionControlSystems::new();
        if config.git.enabled {
            match Git::lookup(&config.git.binary) {
                Ok(git) => vcs.register(Arc::new(git)),
                Err(e) => tracing::warn!(error = %e, "git backend disabled."),
            }
        }
        let work_dir = std::env::current_dir()
            .map_err(|e| Error::io_error(format!("could not get working directory: {e}")))?;
        Ok(Self {
            vcs,
            terminal: Arc::new(SystemTerminal::new(&config.tmux)?),
            work_dir,
            deadline: config.timeout(),
        })
    }

    /// Run `fut` under the command deadline.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::DeadlineExceeded` if `fut` does not finish
    /// in time, otherwise whatever `fut` returns.
    pub async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.deadline, fut).await.map_err(|_| {
            Error::from(ExecutionError::DeadlineExceeded {
                secs: self.deadline.as_secs(),
            })
        })?
    }

    /// The repository the command was started in.
    pub async fn current_repository(&self) -> Result<Arc<dyn Repository>> {
        self.vcs.repository_at(&self.work_dir).await
    }

    pub async fn maybe_current_repository(&self) -> Result<Option<Arc<dyn Repository>>> {
        self.vcs.maybe_repository_at(&self.work_dir).await
    }

    /// The session this process runs in.
    ///
    /// # Errors
    ///
    /// Returns `SystemError::NotInTmux` outside tmux.
    pub fn current_session(&self) -> Result<Arc<dyn Session>> {
        let (srv, inside) = self.terminal.server();
        if !inside {
            return Err(SystemError::NotInTmux.into());
        }
        srv.current_session()
            .ok_or_else(|| SystemError::NotInTmux.into())
    }
}

/// The session for a work unit, creating it if needed.
async fn session_for(
    st: &mut State,
    repo: &Arc<dyn Repository>,
    work_unit: &str,
) -> Result<Arc<dyn Session>> {
    match st.session(repo.as_ref(), work_unit) {
        Some(sesh) => Ok(sesh),
        None => st.new_session(repo, work_unit).await,
    }
}


#[cfg(test)]
mod tests {
    use tmux_vcs_sync_core::testing::{FakeServer, FakeVcs};

    use super::*;

    #[tokio::test]
    async fn test_bounded_reports_deadline() {
        let vcs = FakeVcs::new("testing/");
        let (mut ctx, _) = fixtures::context(&vcs, &FakeServer::new(1), "testing/repo");
        ctx.deadline = Duration::from_millis(10);
        let err = ctx
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .err();
        assert_eq!(err, Some(ExecutionError::DeadlineExceeded { secs: 0 }.into()));
    }

    #[tokio::test]
    async fn test_current_session_requires_tmux() {
        let vcs = FakeVcs::new("testing/");
        let srv = FakeServer::new(1);
        let id = srv.add_session("foo", "testing/repo");
        let (ctx, _) = fixtures::context(&vcs, &srv, "testing/repo");
        assert_eq!(ctx.current_session().err(), Some(SystemError::NotInTmux.into()));

        srv.set_attached(Some(id.as_str()));
        assert_eq!(ctx.current_session().map(|s| s.id().to_string()).ok(), Some(id));
    }
}
