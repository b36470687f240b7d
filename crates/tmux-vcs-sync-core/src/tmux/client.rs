//! tmux client backend.

use std::collections::HashMap;

use itertools::Itertools;

use super::{env::TmuxEnv, Client, ClientProperty, MenuElement, TmuxServer};
use crate::{exec::Executable, Result, ResultExt};

/// A terminal attached to a tmux server.
#[derive(Debug, Clone)]
pub struct TmuxClient {
    server: TmuxServer,
    /// `None` addresses the client running this process, which tmux
    /// resolves by itself.
    tty: Option<String>,
}

impl TmuxClient {
    pub const fn new(server: TmuxServer, tty: String) -> Self {
        Self {
            server,
            tty: Some(tty),
        }
    }

    /// The client this process is running in.
    ///
    /// # Errors
    ///
    /// Returns `SystemError::NotInTmux` outside tmux.
    pub fn current(tmux: Executable) -> Result<Self> {
        let env = TmuxEnv::from_env()?;
        Ok(Self {
            server: TmuxServer::from_env(tmux, &env),
            tty: None,
        })
    }

    fn display_menu_args(&self, elems: &[MenuElement]) -> Vec<String> {
        let mut args = vec!["display-menu".to_string()];
        if let Some(tty) = &self.tty {
            args.extend(["-c".to_string(), tty.clone()]);
        }
        args.extend(elems.iter().flat_map(MenuElement::args));
        args
    }
}

#[async_trait::async_trait]
impl Client for TmuxClient {
    async fn properties(&self, props: &[ClientProperty]) -> Result<HashMap<ClientProperty, String>> {
        let format = props.iter().map(|p| p.format()).join("\n");
        let mut args = vec!["display-message".to_string(), "-p".to_string(), "-F".to_string(), format];
        if let Some(tty) = &self.tty {
            args.extend(["-t".to_string(), tty.clone()]);
        }
        let stdout = self
            .server
            .command(args)
            .stdout()
            .await
            .with_context(|| format!("client {}", self.tty.as_deref().unwrap_or("<<current>>")))?;
        Ok(props
            .iter()
            .copied()
            .zip(stdout.split('\n').map(String::from))
            .collect())
    }

    async fn display_menu(&self, elems: &[MenuElement]) -> Result<()> {
        self.server.command(self.display_menu_args(elems)).run().await
    }
}
