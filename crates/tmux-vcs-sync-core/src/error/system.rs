//! System error types for subprocesses and the environment.
//!
//! These errors represent failures talking to tmux or a version control
//! binary, which are typically out of the user's direct control.

use thiserror::Error;

/// System errors represent failures in IO or external commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SystemError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(String),
    /// External command exited unsuccessfully
    #[error("{}", render_command_failure(.program, .args, .exit_code, .stderr))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// External command could not be found or started
    #[error("Failed to execute {program}: {reason}")]
    CommandNotFound { program: String, reason: String },
    /// The operation requires running inside tmux
    #[error("must be called from within a tmux session")]
    NotInTmux,
    /// A session was handed to a server it does not belong to
    #[error("session {session_id} belongs to a different tmux server")]
    DifferentServer { session_id: String },
}

fn render_command_failure(
    program: &str,
    args: &[String],
    exit_code: &Option<i32>,
    stderr: &str,
) -> String {
    let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    let mut msg = format!("{program} {} failed (exit {code})", args.join(" "));
    if !stderr.is_empty() {
        msg.push_str(": ");
        msg.push_str(stderr);
    }
    msg
}

impl SystemError {
    /// Get exit code for system errors.
    /// - Missing binary: 3
    /// - Other system errors: 2
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::CommandNotFound { .. } => 3,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = SystemError::Io("file not found".into());
        assert_eq!(err.to_string(), "IO error: file not found");
    }

    #[test]
    fn test_command_failed_display() {
        let err = SystemError::CommandFailed {
            program: "tmux".to_string(),
            args: vec!["kill-session".to_string(), "-t".to_string(), "$1".to_string()],
            exit_code: Some(1),
            stderr: "can't find session: $1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "tmux kill-session -t $1 failed (exit 1): can't find session: $1"
        );
    }

    #[test]
    fn test_command_failed_killed_by_signal() {
        let err = SystemError::CommandFailed {
            program: "git".to_string(),
            args: vec!["status".to_string()],
            exit_code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "git status failed (exit signal)");
    }

    #[test]
    fn test_exit_codes() {
        let missing = SystemError::CommandNotFound {
            program: "tmux".to_string(),
            reason: "No such file or directory (os error 2)".to_string(),
        };
        assert_eq!(missing.exit_code(), 3);
        assert_eq!(SystemError::NotInTmux.exit_code(), 2);
    }
}
