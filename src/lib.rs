//! Drive git as composable, cancellable task chains.
//!
//! - [`task`]: the chain engine and process backends
//! - [`git`]: [`GitClient`](git::GitClient), one chain per git command
//! - [`repository`]: a repository snapshot kept current by manager notifications

pub mod config;
pub mod git;
pub mod repository;
pub mod task;
pub mod util;

pub use config::{ClientSettings, SettingsError};
pub use git::GitClient;
pub use repository::{GitRepositoryManager, Repository, RepositoryEvent};
pub use task::{ChainError, ChainState, TaskChain, TaskFailure, TaskOutcome};
