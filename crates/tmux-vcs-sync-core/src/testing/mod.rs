//! In-memory stand-ins for tmux and a VCS, plus the behavior every
//! repository backend is checked against.
//!
//! Both fakes keep their state behind a shared lock, so every handle the
//! engine holds observes the same world as the test that built it.

mod contract;
mod fake_tmux;
mod fake_vcs;

pub use contract::{repository_contract, ContractOptions};
pub use fake_tmux::{FakeServer, FakeSession};
pub use fake_vcs::{FakeRepository, FakeVcs, RepoConfig, DEFAULT_WORK_UNIT};
