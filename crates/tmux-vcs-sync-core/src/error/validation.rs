//! Validation error types for user input and configuration.
//!
//! These errors represent requests the caller can correct, such as asking
//! for a session that does not exist or one that would collide with an
//! existing session.

use thiserror::Error;

/// Validation errors represent incorrect input or configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The target of a create or rename is already taken
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The source of a rename is not known
    #[error("{0} does not exist")]
    DoesNotExist(String),
    /// A name could not be interpreted
    #[error("Invalid name: {0}")]
    InvalidName(String),
    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Parse error when reading configuration or collaborator output
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ValidationError {
    /// Get exit code for validation errors (always 1).
    pub const fn exit_code(&self) -> i32 {
        1
    }
}
