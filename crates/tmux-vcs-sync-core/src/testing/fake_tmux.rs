use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    tmux::{self, NewSessionOptions, Server, Session, SessionProperties, SessionProperty, Sessions},
    Error, Result, SystemError,
};

#[derive(Debug)]
struct SessionState {
    name: String,
    path: String,
    dead: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    next_id: u64,
    order: Vec<String>,
    sessions: HashMap<String, SessionState>,
    attached: Option<String>,
    kills: Vec<String>,
    renames: usize,
    fail_renames: bool,
}

impl ServerState {
    fn live(&self, id: &str) -> Result<&SessionState> {
        self.sessions
            .get(id)
            .filter(|s| !s.dead)
            .ok_or_else(|| Error::not_found(format!("tmux session {id}")))
    }

    fn name_taken(&self, name: &str) -> bool {
        self.sessions.values().any(|s| !s.dead && s.name == name)
    }

    fn live_ids(&self) -> impl Iterator<Item = &String> {
        self.order.iter().filter(|id| self.sessions.get(*id).is_some_and(|s| !s.dead))
    }
}

/// An in-memory tmux server.
///
/// Session IDs look like `<pid>#<n>`. Killed sessions disappear from
/// listings and fail every further operation. Clones share state.
#[derive(Debug, Clone)]
pub struct FakeServer {
    pid: u32,
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            state: Arc::default(),
        }
    }

    /// Create a session directly and return its ID. An empty name gets the
    /// session's number, like tmux does.
    pub fn add_session(&self, name: &str, path: &str) -> String {
        let mut st = self.lock();
        let n = st.next_id;
        st.next_id += 1;
        let id = format!("{}#{n}", self.pid);
        let name = if name.is_empty() { n.to_string() } else { name.to_string() };
        st.order.push(id.clone());
        st.sessions.insert(
            id.clone(),
            SessionState {
                name,
                path: path.to_string(),
                dead: false,
            },
        );
        id
    }

    /// Names of live sessions, oldest first.
    pub fn session_names(&self) -> Vec<String> {
        let st = self.lock();
        st.live_ids().filter_map(|id| st.sessions.get(id)).map(|s| s.name.clone()).collect()
    }

    /// `(name, path)` of live sessions, oldest first.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let st = self.lock();
        st.live_ids()
            .filter_map(|id| st.sessions.get(id))
            .map(|s| (s.name.clone(), s.path.clone()))
            .collect()
    }

    /// ID of the live session called `name`.
    pub fn session_id(&self, name: &str) -> Option<String> {
        let st = self.lock();
        let id = st.live_ids().find(|id| st.sessions.get(*id).is_some_and(|s| s.name == name));
        id.cloned()
    }

    /// A handle to the session with `id`, live or not.
    pub fn session(&self, id: &str) -> Arc<dyn Session> {
        Arc::new(FakeSession {
            server: self.clone(),
            id: id.to_string(),
        })
    }

    /// Session IDs in the order they were killed.
    pub fn kill_order(&self) -> Vec<String> {
        self.lock().kills.clone()
    }

    /// How many successful renames have happened.
    pub fn rename_count(&self) -> usize {
        self.lock().renames
    }

    /// ID of the session a client is attached to.
    pub fn attached(&self) -> Option<String> {
        self.lock().attached.clone()
    }

    /// Pretend this process runs inside session `id`.
    pub fn set_attached(&self, id: Option<&str>) {
        self.lock().attached = id.map(ToString::to_string);
    }

    /// Make every rename fail.
    pub fn set_fail_renames(&self, fail: bool) {
        self.lock().fail_renames = fail;
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Server for FakeServer {
    async fn pid(&self) -> Result<u32> {
        Ok(self.pid)
    }

    async fn list_sessions(&self) -> Result<Sessions> {
        let ids: Vec<String> = self.lock().live_ids().cloned().collect();
        let sessions = ids.iter().map(|id| self.session(id)).collect();
        Ok(Sessions::new(Arc::new(self.clone()), sessions))
    }

    async fn session_properties(
        &self,
        ids: &[String],
        props: &[SessionProperty],
    ) -> Result<HashMap<String, SessionProperties>> {
        let st = self.lock();
        let mut out = HashMap::new();
        for id in ids {
            let Ok(sesh) = st.live(id) else {
                continue;
            };
            let values = props
                .iter()
                .map(|prop| {
                    let value = match prop {
                        SessionProperty::Id => id.clone(),
                        SessionProperty::Name => sesh.name.clone(),
                        SessionProperty::Path => sesh.path.clone(),
                    };
                    (*prop, value)
                })
                .collect();
            out.insert(id.clone(), values);
        }
        Ok(out)
    }

    async fn new_session(&self, opts: NewSessionOptions) -> Result<Arc<dyn Session>> {
        let name = opts.name.unwrap_or_default();
        if !name.is_empty() && self.lock().name_taken(&name) {
            return Err(Error::already_exists(format!("tmux session {name:?}")));
        }
        let path = match opts.start_dir {
            Some(dir) => dir.to_string_lossy().into_owned(),
            None => std::env::current_dir()
                .map(|d| d.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let id = self.add_session(&name, &path);
        Ok(self.session(&id))
    }

    async fn attach_or_switch(&self, session: &dyn Session) -> Result<()> {
        if !tmux::same_server(session.server().as_ref(), self).await {
            return Err(SystemError::DifferentServer {
                session_id: session.id().to_string(),
            }
            .into());
        }
        let mut st = self.lock();
        st.live(session.id())?;
        st.attached = Some(session.id().to_string());
        Ok(())
    }

    fn current_session(&self) -> Option<Arc<dyn Session>> {
        let id = self.lock().attached.clone()?;
        Some(self.session(&id))
    }

    async fn kill(&self) -> Result<()> {
        let mut st = self.lock();
        for sesh in st.sessions.values_mut() {
            sesh.dead = true;
        }
        st.attached = None;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FakeSession {
    server: FakeServer,
    id: String,
}

#[async_trait::async_trait]
impl Session for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn server(&self) -> Arc<dyn Server> {
        Arc::new(self.server.clone())
    }

    async fn rename(&self, name: &str) -> Result<()> {
        let mut st = self.server.lock();
        st.live(&self.id)?;
        if st.fail_renames {
            return Err(Error::io_error(format!("could not rename tmux session {}", self.id)));
        }
        let taken = st
            .sessions
            .iter()
            .any(|(id, s)| *id != self.id && !s.dead && s.name == name);
        if taken {
            return Err(Error::already_exists(format!("tmux session {name:?}")));
        }
        if let Some(sesh) = st.sessions.get_mut(&self.id) {
            sesh.name = name.to_string();
        }
        st.renames += 1;
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        let mut st = self.server.lock();
        st.live(&self.id)?;
        if let Some(sesh) = st.sessions.get_mut(&self.id) {
            sesh.dead = true;
        }
        st.kills.push(self.id.clone());
        if st.attached.as_deref() == Some(self.id.as_str()) {
            st.attached = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_and_properties() -> Result<()> {
        let srv = FakeServer::new(7);
        let id = srv.add_session("foo", "/src/foo");
        let unnamed = srv.add_session("", "/tmp");
        assert_eq!(id, "7#0");

        let sessions = srv.list_sessions().await?;
        assert_eq!(sessions.ids(), [id.clone(), unnamed.clone()]);
        let names = sessions.property(SessionProperty::Name).await?;
        assert_eq!(names[&unnamed], "1");
        assert_eq!(srv.session(&id).property(SessionProperty::Path).await?, "/src/foo");
        Ok(())
    }

    #[tokio::test]
    async fn test_killed_sessions_vanish() -> Result<()> {
        let srv = FakeServer::new(1);
        let id = srv.add_session("foo", "");
        let sesh = srv.session(&id);
        sesh.kill().await?;
        assert!(srv.list_sessions().await?.is_empty());
        assert!(sesh.kill().await.is_err());
        assert!(sesh.rename("bar").await.is_err());
        assert_eq!(srv.kill_order(), [id]);
        Ok(())
    }

    #[tokio::test]
    async fn test_killing_the_server_ends_every_session() -> Result<()> {
        let srv = FakeServer::new(1);
        let foo = srv.add_session("foo", "/src/foo");
        srv.add_session("bar", "/src/bar");
        srv.set_attached(Some(&foo));

        srv.kill().await?;
        assert!(srv.list_sessions().await?.is_empty());
        assert!(srv.session_names().is_empty());
        assert_eq!(srv.attached(), None);
        assert!(srv.current_session().is_none());
        assert!(srv.session(&foo).rename("baz").await.is_err());
        // Sessions end with the server; nothing was killed one by one.
        assert!(srv.kill_order().is_empty());

        // A name freed by the kill can be reused.
        srv.new_session(NewSessionOptions::new("foo", "/src/foo")).await?;
        assert_eq!(srv.session_names(), ["foo"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_names_are_unique() -> Result<()> {
        let srv = FakeServer::new(1);
        srv.add_session("foo", "");
        let bar = srv.add_session("bar", "");
        assert!(srv.session(&bar).rename("foo").await.is_err());
        assert!(srv.new_session(NewSessionOptions::new("foo", "/")).await.is_err());
        srv.session(&bar).rename("baz").await?;
        assert_eq!(srv.session_names(), ["foo", "baz"]);
        assert_eq!(srv.rename_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_attach_sets_current_session() -> Result<()> {
        let srv = FakeServer::new(1);
        let other = FakeServer::new(2);
        let id = srv.add_session("foo", "");
        let foreign = other.add_session("foo", "");

        srv.attach_or_switch(srv.session(&id).as_ref()).await?;
        assert_eq!(srv.attached(), Some(id.clone()));
        assert_eq!(srv.current_session().map(|s| s.id().to_string()), Some(id));

        let err = srv.attach_or_switch(other.session(&foreign).as_ref()).await.err();
        assert!(matches!(err, Some(Error::System(SystemError::DifferentServer { .. }))));
        Ok(())
    }
}
