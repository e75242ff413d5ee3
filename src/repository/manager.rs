//! The seam between a [`Repository`](super::Repository) and whatever keeps it
//! up to date.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::git::{ConfigBranch, GitLock, GitLogEntry, GitStatus, GitUser, RemoteBranchIndex, RepositoryConfig};
use crate::task::TaskChain;

/// Raw change notifications emitted by a repository manager.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryNotification {
    HeadUpdated(String),
    StatusUpdated(GitStatus),
    LocksUpdated(Vec<GitLock>),
    LocalBranchListUpdated(BTreeMap<String, ConfigBranch>),
    RemoteBranchListUpdated(RemoteBranchIndex),
    LocalBranchAdded(String),
    LocalBranchRemoved(String),
    RemoteBranchAdded { remote: String, branch: String },
    RemoteBranchRemoved { remote: String, branch: String },
    /// The tip of a local branch moved.
    LocalBranchCommitChanged(String),
    UserLoaded(GitUser),
}

pub trait RepositoryManager: Send + Sync {
    /// A new receiver of every notification published from now on.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<RepositoryNotification>;

    /// Snapshot of the branch and remote configuration.
    fn config(&self) -> RepositoryConfig;

    /// Remote to prefer when the current branch tracks nothing.
    fn default_remote(&self) -> Option<String> {
        None
    }

    /// Reload everything and publish the matching notifications.
    fn refresh(&self) -> TaskChain<()>;

    fn remote_add(&self, name: &str, url: &str) -> TaskChain<()>;

    fn remote_change(&self, name: &str, url: &str) -> TaskChain<()>;

    fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> TaskChain<()>;

    fn pull(&self, remote: Option<&str>, branch: Option<&str>) -> TaskChain<()>;

    fn fetch(&self, remote: Option<&str>) -> TaskChain<()>;

    fn revert(&self, commit: &str) -> TaskChain<()>;

    /// Also publishes [`RepositoryNotification::LocksUpdated`] on success.
    fn list_locks(&self) -> TaskChain<Vec<GitLock>>;

    fn lock_file(&self, file: &str) -> TaskChain<GitLock>;

    fn unlock_file(&self, file: &str, force: bool) -> TaskChain<()>;

    fn commit_all_files(&self, message: &str, body: Option<&str>) -> TaskChain<()>;

    fn commit_files(&self, files: &[String], message: &str, body: Option<&str>) -> TaskChain<()>;

    fn log(&self, limit: Option<usize>) -> TaskChain<Vec<GitLogEntry>>;
}
