//! tmux session backend and the batched property query.

use std::{collections::HashMap, sync::Arc};

use itertools::Itertools;

use super::{Server, Session, SessionProperties, SessionProperty, TmuxServer};
use crate::{Error, Result, ResultExt};

#[derive(Debug, Clone)]
pub struct TmuxSession {
    server: TmuxServer,
    id: String,
}

impl TmuxSession {
    pub(crate) const fn new(server: TmuxServer, id: String) -> Self {
        Self { server, id }
    }
}

#[async_trait::async_trait]
impl Session for TmuxSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn server(&self) -> Arc<dyn Server> {
        Arc::new(self.server.clone())
    }

    async fn rename(&self, name: &str) -> Result<()> {
        self.server
            .command(["rename-session", "-t", self.id.as_str(), name])
            .run()
            .await
            .with_context(|| format!("could not rename session {:?} to {name:?}", self.id))
    }

    async fn kill(&self) -> Result<()> {
        self.server
            .command(["kill-session", "-t", self.id.as_str()])
            .run()
            .await
            .with_context(|| format!("could not kill session {:?}", self.id))
    }
}

/// `-F` format printing the session id followed by `props`, one per line.
pub(crate) fn properties_format(props: &[SessionProperty]) -> String {
    std::iter::once(SessionProperty::Id)
        .chain(props.iter().copied())
        .map(SessionProperty::format)
        .join("\n")
}

/// `-f` filter matching exactly the sessions in `ids`.
///
/// tmux's `||` only takes two operands, so the comparisons are nested.
pub(crate) fn id_filter(ids: &[String]) -> String {
    let id = SessionProperty::Id.format();
    ids.iter()
        .map(|sid| format!("#{{==:{id},{sid}}}"))
        .reduce(|acc, f| format!("#{{||:{acc},{f}}}"))
        .unwrap_or_default()
}

/// Parse output of a [`properties_format`] query.
pub(crate) fn parse_properties(
    stdout: &str,
    props: &[SessionProperty],
) -> Result<HashMap<String, SessionProperties>> {
    let stdout = stdout.strip_suffix('\n').unwrap_or(stdout);
    if stdout.is_empty() {
        return Ok(HashMap::new());
    }
    let lines: Vec<&str> = stdout.split('\n').collect();
    let stride = props.len() + 1;
    if lines.len() % stride != 0 {
        return Err(Error::parse_error(format!(
            "expected {stride} lines per session from tmux, got {} lines",
            lines.len()
        )));
    }
    Ok(lines
        .chunks(stride)
        .map(|chunk| {
            let values = props
                .iter()
                .copied()
                .zip(chunk[1..].iter().map(|v| (*v).to_string()))
                .collect();
            (chunk[0].to_string(), values)
        })
        .collect())
}
