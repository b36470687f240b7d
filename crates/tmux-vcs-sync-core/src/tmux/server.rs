//! tmux server backend.

use std::{collections::HashMap, fmt, path::PathBuf, sync::Arc};

use super::{
    env::TmuxEnv, same_server, session, NewSessionOptions, Server, Session, SessionProperties,
    SessionProperty, Sessions, TmuxSession,
};
use crate::{
    exec::{Executable, Invocation},
    Error, Result, SystemError,
};

/// How to reach a tmux server. Empty means the default socket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOptions {
    pub socket_path: Option<PathBuf>,
    pub socket_name: Option<String>,
    pub config_file: Option<PathBuf>,
}

impl ServerOptions {
    pub fn socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    pub fn config_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.config_file = Some(file.into());
        self
    }

    fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.socket_path {
            args.extend(["-S".to_string(), path.to_string_lossy().into_owned()]);
        }
        if let Some(name) = &self.socket_name {
            args.extend(["-L".to_string(), name.clone()]);
        }
        if let Some(file) = &self.config_file {
            args.extend(["-f".to_string(), file.to_string_lossy().into_owned()]);
        }
        args
    }
}

/// A tmux server reached through the `tmux` binary.
///
/// Constructing one does not start a server; the first new session does.
#[derive(Debug, Clone)]
pub struct TmuxServer {
    tmux: Executable,
    opts: ServerOptions,
}

impl fmt::Display for TmuxServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.opts.socket_path, &self.opts.socket_name) {
            (Some(path), _) => write!(f, "{}", path.display()),
            (None, Some(name)) => write!(f, "{name}"),
            (None, None) => write!(f, "<<default server>>"),
        }
    }
}

impl TmuxServer {
    pub const fn new(tmux: Executable, opts: ServerOptions) -> Self {
        Self { tmux, opts }
    }

    /// The server this process is running inside of.
    ///
    /// # Errors
    ///
    /// Returns `SystemError::NotInTmux` outside tmux.
    pub fn current(tmux: Executable) -> Result<Self> {
        let env = TmuxEnv::from_env()?;
        Ok(Self::from_env(tmux, &env))
    }

    /// The current server inside tmux, otherwise a server built from `opts`.
    /// The flag reports whether we are inside tmux.
    pub fn current_or(tmux: Executable, opts: ServerOptions) -> (Self, bool) {
        match TmuxEnv::maybe_from_env() {
            Some(env) => {
                let srv = Self::from_env(tmux, &env);
                tracing::info!(server = %srv, "Found tmux server.");
                (srv, true)
            }
            None => (Self::new(tmux, opts), false),
        }
    }

    pub(crate) fn from_env(tmux: Executable, env: &TmuxEnv) -> Self {
        Self::new(
            tmux,
            ServerOptions {
                socket_path: Some(env.socket_path.clone()),
                ..ServerOptions::default()
            },
        )
    }

    pub(crate) fn command<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = self
            .opts
            .args()
            .into_iter()
            .chain(args.into_iter().map(Into::into));
        self.tmux.invoke(args)
    }

    fn session(&self, id: impl Into<String>) -> TmuxSession {
        TmuxSession::new(self.clone(), id.into())
    }
}

/// tmux's stderr when there is nothing to list.
fn is_no_server(stderr: &str) -> bool {
    // Socket doesn't exist yet, or exists without a server behind it.
    stderr.contains("No such file or directory") || stderr.contains("no server running")
}

#[async_trait::async_trait]
impl Server for TmuxServer {
    async fn pid(&self) -> Result<u32> {
        let pid = self
            .command(["display-message", "-p", "-F", "#{pid}"])
            .stdout()
            .await?;
        pid.trim()
            .parse()
            .map_err(|e| Error::parse_error(format!("tmux pid {pid:?}: {e}")))
    }

    async fn list_sessions(&self) -> Result<Sessions> {
        let invocation = self.command(["list-sessions", "-F", SessionProperty::Id.format()]);
        let out = invocation.clone().output().await?;
        if !out.success() {
            if is_no_server(&out.stderr) {
                return Ok(Sessions::new(Arc::new(self.clone()), Vec::new()));
            }
            return Err(invocation.failure(out.exit_code, &out.stderr));
        }
        let sessions = out
            .stdout
            .lines()
            .filter(|id| !id.is_empty())
            .map(|id| Arc::new(self.session(id)) as Arc<dyn Session>)
            .collect();
        Ok(Sessions::new(Arc::new(self.clone()), sessions))
    }

    async fn session_properties(
        &self,
        ids: &[String],
        props: &[SessionProperty],
    ) -> Result<HashMap<String, SessionProperties>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let format = session::properties_format(props);
        let filter = session::id_filter(ids);
        let invocation = self.command(["list-sessions", "-F", format.as_str(), "-f", filter.as_str()]);
        let out = invocation.clone().output().await?;
        if !out.success() {
            return Err(invocation.failure(out.exit_code, &out.stderr));
        }
        session::parse_properties(&out.stdout, props)
    }

    async fn new_session(&self, opts: NewSessionOptions) -> Result<Arc<dyn Session>> {
        let args = ["new-session", "-d", "-P", "-F", SessionProperty::Id.format()]
            .into_iter()
            .map(String::from)
            .chain(opts.args());
        // tmux wants a tty.
        let id = self.command(args).inherit_stdin().stdout().await?;
        Ok(Arc::new(self.session(id.trim())))
    }

    async fn attach_or_switch(&self, session: &dyn Session) -> Result<()> {
        if !same_server(self, session.server().as_ref()).await {
            return Err(SystemError::DifferentServer {
                session_id: session.id().to_string(),
            }
            .into());
        }
        if TmuxEnv::is_set() {
            self.command(["switch-client", "-t", session.id()])
                .inherit_stdin()
                .run()
                .await
        } else {
            self.command(["attach-session", "-t", session.id()])
                .interactive()
                .run()
                .await
        }
    }

    fn current_session(&self) -> Option<Arc<dyn Session>> {
        let env = TmuxEnv::maybe_from_env()?;
        let srv = Self::from_env(self.tmux.clone(), &env);
        tracing::info!(server = %srv, session = %env.session_id, "Found current tmux session.");
        Some(Arc::new(srv.session(env.session_id)))
    }

    async fn kill(&self) -> Result<()> {
        self.command(["kill-server"]).run().await
    }
}
