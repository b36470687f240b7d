//! The `$TMUX` environment variable.
//!
//! tmux sets `TMUX=<socket path>,<server pid>,<session number>` in every
//! pane. That is enough to address the server and session this process runs
//! in without asking tmux.

use std::path::PathBuf;

use crate::{Error, Result, SystemError};

pub const TMUX_VAR: &str = "TMUX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxEnv {
    pub socket_path: PathBuf,
    pub pid: u32,
    /// `$N`, the session id tmux uses in `-t` targets.
    pub session_id: String,
}

impl TmuxEnv {
    /// Read `$TMUX`.
    ///
    /// # Errors
    ///
    /// Returns `SystemError::NotInTmux` if it is unset or malformed.
    pub fn from_env() -> Result<Self> {
        std::env::var(TMUX_VAR)
            .map_err(|_| Error::System(SystemError::NotInTmux))
            .and_then(|value| Self::parse(&value))
    }

    /// `$TMUX` if this process is running inside tmux.
    pub fn maybe_from_env() -> Option<Self> {
        Self::from_env().ok()
    }

    /// Whether `$TMUX` is set at all.
    pub fn is_set() -> bool {
        std::env::var_os(TMUX_VAR).is_some_and(|v| !v.is_empty())
    }

    /// # Errors
    ///
    /// Returns `SystemError::NotInTmux` if `value` is not of the form
    /// `socket,pid,session`.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.splitn(3, ',');
        let (Some(socket), Some(pid), Some(session)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(SystemError::NotInTmux.into());
        };
        if socket.is_empty() || session.is_empty() {
            return Err(SystemError::NotInTmux.into());
        }
        let pid = pid.parse().map_err(|_| Error::System(SystemError::NotInTmux))?;
        Ok(Self {
            socket_path: PathBuf::from(socket),
            pid,
            session_id: format!("${session}"),
        })
    }
}
