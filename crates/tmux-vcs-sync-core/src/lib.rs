//! # tmux-vcs-sync core
//!
//! Keeps tmux sessions and version control work units in one-to-one
//! correspondence: one session per branch, named after it.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Layout
//!
//! - [`state`]: the reconciliation engine and the session naming scheme
//! - [`tmux`]: the tmux collaborator contract and its subprocess backend
//! - [`vcs`]: the repository collaborator contract and the git backend
//! - [`testing`]: in-memory fakes of both collaborators and the checks
//!   every repository backend must pass
//! - [`exec`], [`config`]: subprocess and configuration glue

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
mod error;
pub mod exec;
pub mod result;
pub mod state;
pub mod testing;
pub mod tmux;
pub mod vcs;

pub use config::Config;
pub use error::{Error, ExecutionError, SystemError, ValidationError};
pub use result::{Result, ResultExt};
pub use state::{RepoName, State, WorkUnitName};
