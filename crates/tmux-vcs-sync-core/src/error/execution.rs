//! Execution error types for lookups and repository state.
//!
//! These errors represent problems with what the collaborators reported,
//! such as an ambiguous lookup or a repository in the middle of a rebase.

use thiserror::Error;

/// Execution errors represent problems with the observed tmux or VCS state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// Resource not found where one was required
    #[error("Not found: {0}")]
    NotFound(String),
    /// The session is not indexed by this engine
    #[error("session {session_id} does not have an associated work unit")]
    NotTracked { session_id: String },
    /// More than one candidate matched where exactly one was expected
    #[error("multiple Repositories match: {}", .candidates.join(", "))]
    Ambiguous { candidates: Vec<String> },
    /// The repository is between work units (e.g. detached HEAD)
    #[error("unable to determine {work_unit_kind} name (is the repo in an unstable state?)")]
    UnstableRepository { work_unit_kind: String },
    /// Topological sorting could not place every work unit
    #[error("only able to topologically sort {sorted} of {total} work units: unsortable: {}", .missing.join(", "))]
    Unsortable {
        sorted: usize,
        total: usize,
        missing: Vec<String>,
    },
    /// No version control systems were registered
    #[error("no registered VCS")]
    NoRegisteredVcs,
    /// The overall command deadline elapsed
    #[error("timed out after {secs}s")]
    DeadlineExceeded { secs: u64 },
}

impl ExecutionError {
    /// Get exit code for execution errors.
    /// - Not found / ambiguous lookups: 3
    /// - Repository or engine state errors: 4
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) | Self::NotTracked { .. } | Self::Ambiguous { .. } => 3,
            _ => 4,
        }
    }
}
