//! Terminal multiplexer collaborator contract.
//!
//! [`Server`], [`Session`] and [`Client`] are implemented by the tmux
//! subprocess backend in this module and by the in-memory fake in
//! [`crate::testing`].

pub mod client;
pub mod env;
pub mod server;
pub mod session;

use std::{collections::HashMap, path::PathBuf, sync::Arc};

pub use client::TmuxClient;
pub use env::TmuxEnv;
pub use server::{ServerOptions, TmuxServer};
pub use session::TmuxSession;

use crate::{Error, Result};

/// Session properties the engine knows how to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionProperty {
    Id,
    Name,
    Path,
}

impl SessionProperty {
    /// The tmux format string that expands to this property.
    pub const fn format(self) -> &'static str {
        match self {
            Self::Id => "#{session_id}",
            Self::Name => "#{session_name}",
            Self::Path => "#{session_path}",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClientProperty {
    Tty,
}

impl ClientProperty {
    pub const fn format(self) -> &'static str {
        match self {
            Self::Tty => "#{client_tty}",
        }
    }
}

pub type SessionProperties = HashMap<SessionProperty, String>;

/// Options for [`Server::new_session`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSessionOptions {
    /// Initial session name; tmux picks one if unset.
    pub name: Option<String>,
    /// Initial working directory.
    pub start_dir: Option<PathBuf>,
}

impl NewSessionOptions {
    pub fn new(name: impl Into<String>, start_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: Some(name.into()),
            start_dir: Some(start_dir.into()),
        }
    }

    pub(crate) fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(name) = &self.name {
            args.extend(["-s".to_string(), name.clone()]);
        }
        if let Some(dir) = &self.start_dir {
            args.extend(["-c".to_string(), dir.to_string_lossy().into_owned()]);
        }
        args
    }
}

#[async_trait::async_trait]
pub trait Server: Send + Sync {
    /// Process ID of the server, if it is running.
    async fn pid(&self) -> Result<u32>;

    async fn list_sessions(&self) -> Result<Sessions>;

    /// Fetch `props` for every session in `ids` in one round trip.
    ///
    /// Sessions that no longer exist are missing from the result.
    async fn session_properties(
        &self,
        ids: &[String],
        props: &[SessionProperty],
    ) -> Result<HashMap<String, SessionProperties>>;

    async fn new_session(&self, opts: NewSessionOptions) -> Result<Arc<dyn Session>>;

    /// Attach the controlling terminal to `session`, or switch the current
    /// client to it when already inside tmux.
    async fn attach_or_switch(&self, session: &dyn Session) -> Result<()>;

    /// The session this process is running in, if any.
    ///
    /// It may belong to a different server; compare with [`same_session`].
    fn current_session(&self) -> Option<Arc<dyn Session>>;

    /// Kill the whole server.
    async fn kill(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Stable identity of the session within its server, e.g. `$3`.
    fn id(&self) -> &str;

    fn server(&self) -> Arc<dyn Server>;

    async fn properties(&self, props: &[SessionProperty]) -> Result<SessionProperties> {
        let id = self.id().to_string();
        self.server()
            .session_properties(std::slice::from_ref(&id), props)
            .await?
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("tmux session {id}")))
    }

    async fn property(&self, prop: SessionProperty) -> Result<String> {
        let mut props = self.properties(&[prop]).await?;
        Ok(props.remove(&prop).unwrap_or_default())
    }

    async fn rename(&self, name: &str) -> Result<()>;

    async fn kill(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait Client: Send + Sync {
    async fn properties(&self, props: &[ClientProperty]) -> Result<HashMap<ClientProperty, String>>;

    async fn property(&self, prop: ClientProperty) -> Result<String> {
        let mut props = self.properties(&[prop]).await?;
        Ok(props.remove(&prop).unwrap_or_default())
    }

    async fn display_menu(&self, elems: &[MenuElement]) -> Result<()>;
}

/// A selectable menu line that runs a tmux command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub name: String,
    pub key: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuElement {
    Entry(MenuEntry),
    /// Separates sections of a menu.
    Spacer,
}

impl MenuElement {
    pub(crate) fn args(&self) -> Vec<String> {
        match self {
            Self::Entry(e) => vec![e.name.clone(), e.key.clone(), e.command.clone()],
            Self::Spacer => vec![String::new()],
        }
    }
}

/// A batch of sessions on one server.
#[derive(Clone)]
pub struct Sessions {
    server: Arc<dyn Server>,
    sessions: Vec<Arc<dyn Session>>,
}

impl Sessions {
    pub fn new(server: Arc<dyn Server>, sessions: Vec<Arc<dyn Session>>) -> Self {
        Self { server, sessions }
    }

    pub fn server(&self) -> Arc<dyn Server> {
        Arc::clone(&self.server)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Session>> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.id().to_string()).collect()
    }

    /// Properties of every session in the batch, keyed by session id.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be queried.
    pub async fn properties(
        &self,
        props: &[SessionProperty],
    ) -> Result<HashMap<String, SessionProperties>> {
        if self.sessions.is_empty() {
            return Ok(HashMap::new());
        }
        self.server.session_properties(&self.ids(), props).await
    }

    /// One property of every session in the batch, keyed by session id.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be queried.
    pub async fn property(&self, prop: SessionProperty) -> Result<HashMap<String, String>> {
        Ok(self
            .properties(&[prop])
            .await?
            .into_iter()
            .map(|(id, mut props)| (id, props.remove(&prop).unwrap_or_default()))
            .collect())
    }
}

impl IntoIterator for Sessions {
    type Item = Arc<dyn Session>;
    type IntoIter = std::vec::IntoIter<Arc<dyn Session>>;

    fn into_iter(self) -> Self::IntoIter {
        self.sessions.into_iter()
    }
}

/// Two servers are the same if they report the same PID.
pub async fn same_server(a: &dyn Server, b: &dyn Server) -> bool {
    match (a.pid().await, b.pid().await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Two sessions are the same if they have the same ID on the same server.
pub async fn same_session(a: &dyn Session, b: &dyn Session) -> bool {
    a.id() == b.id() && same_server(a.server().as_ref(), b.server().as_ref()).await
}
