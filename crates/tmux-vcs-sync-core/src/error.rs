//! Error types for tmux-vcs-sync with categorization:
//!
//! - **Validation errors**: Input and configuration problems (exit code 1)
//! - **System errors**: IO and subprocess failures (exit code 2 or 3)
//! - **Execution errors**: Lookups and repository state (exit code 3 or 4)
//!
//! Best-effort batch steps collect their failures into [`Error::Multiple`]
//! instead of stopping at the first one.

pub mod execution;
pub mod system;
pub mod validation;

use std::fmt;

pub use execution::ExecutionError;
pub use system::SystemError;
pub use validation::ValidationError;

/// Top-level error type that can represent any error in the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Validation error from input or configuration
    Validation(ValidationError),
    /// System error from IO or external commands
    System(SystemError),
    /// Execution error from lookups or repository state
    Execution(ExecutionError),
    /// An error with a message describing what was being attempted
    Context { context: String, source: Box<Error> },
    /// Several independent failures from one batch step
    Multiple(Vec<Error>),
}

// Convenience constructors
impl Error {
    /// Create a validation error for a create/rename target that is taken.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::Validation(ValidationError::AlreadyExists(what.into()))
    }

    /// Create a validation error for a rename source that is unknown.
    pub fn does_not_exist(what: impl Into<String>) -> Self {
        Self::Validation(ValidationError::DoesNotExist(what.into()))
    }

    /// Create a validation error from an uninterpretable name.
    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::InvalidName(msg.into()))
    }

    /// Create a validation error from an invalid config.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::InvalidConfig(msg.into()))
    }

    /// Create a validation error from a parse error.
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::Parse(msg.into()))
    }

    /// Create a system error from an IO error.
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::System(SystemError::Io(msg.into()))
    }

    /// Create an execution error for a missing resource.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::NotFound(msg.into()))
    }

    /// Create an execution error naming every matching candidate.
    pub fn ambiguous(candidates: Vec<String>) -> Self {
        Self::Execution(ExecutionError::Ambiguous { candidates })
    }

    /// Wrap this error with a description of what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Join a batch of errors. Returns `None` when the batch is empty and
    /// the lone error itself when there is exactly one.
    pub fn join(errors: Vec<Self>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.into_iter().next(),
            _ => Some(Self::Multiple(errors)),
        }
    }

    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit code scheme:
    /// - 1: User error (validation, invalid input, bad configuration)
    /// - 2: System error (IO, external commands)
    /// - 3: Not found (sessions, repositories, binaries)
    /// - 4: Invalid state (unstable repository, deadline exceeded)
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(err) => err.exit_code(),
            Self::System(err) => err.exit_code(),
            Self::Execution(err) => err.exit_code(),
            Self::Context { source, .. } => source.exit_code(),
            Self::Multiple(errs) => errs.first().map_or(2, Self::exit_code),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::System(err) => write!(f, "{err}"),
            Self::Execution(err) => write!(f, "{err}"),
            Self::Context { context, source } => write!(f, "{context}: {source}"),
            Self::Multiple(errs) => {
                for (i, err) in errs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<SystemError> for Error {
    fn from(err: SystemError) -> Self {
        Self::System(err)
    }
}

impl From<ExecutionError> for Error {
    fn from(err: ExecutionError) -> Self {
        Self::Execution(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::parse_error(format!("Failed to parse config: {err}"))
    }
}
