// Git module - the command catalog
//
// This module is split into logical submodules:
// - client: GitClient and the repository-level commands (status, log, config)
// - branches: Branch and remote management
// - commit: Staging and committing, batched over paths
// - sync: Fetch, pull, push and revert
// - locks: Git LFS locks
// - install: Installation discovery and validation
// - parsers: Output interpreters, one per command family
// - status, config, types, version: Value types and their parsers

pub mod branches;
pub mod client;
pub mod commit;
pub mod config;
pub mod install;
pub mod locks;
pub mod parsers;
pub mod status;
pub mod sync;
pub mod types;
pub mod version;

pub use client::GitClient;
pub use config::{ConfigBranch, ConfigRemote, RepositoryConfig};
pub use install::discover_git;
pub use parsers::{packed_ref_names, RemoteBranchIndex};
pub use status::parse_porcelain_status;
pub use types::*;
pub use version::{Version, VersionError};
