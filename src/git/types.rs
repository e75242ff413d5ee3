//! Git value types produced by the output interpreters.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::version::Version;

/// Git status entry (porcelain v1: X=index/staged, Y=worktree/unstaged)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitStatusEntry {
    pub path: String,
    pub code: String,
    pub orig_path: Option<String>,
    /// Whether the entry describes the index side (X != ' ')
    pub staged: bool,
}

/// Snapshot of `git status -b --porcelain=v1 -z`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitStatus {
    pub local_branch: Option<String>,
    pub remote_branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub entries: Vec<GitStatusEntry>,
}

impl GitStatus {
    pub fn staged_count(&self) -> usize {
        self.entries.iter().filter(|e| e.staged).count()
    }

    pub fn has_staged_changes(&self) -> bool {
        self.staged_count() > 0
    }

    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Git log entry (single commit)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitLogEntry {
    pub commit_id: String,
    pub summary: String,
    pub body: String,
    pub author_name: String,
    pub author_email: String,
    pub time: DateTime<FixedOffset>,
}

impl GitLogEntry {
    pub fn short_id(&self) -> &str {
        &self.commit_id[..self.commit_id.len().min(7)]
    }
}

/// Git LFS lock as reported by `git lfs locks --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLock {
    pub id: String,
    pub path: String,
    pub owner: GitLockOwner,
    pub locked_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLockOwner {
    pub name: String,
}

/// Configured identity; either half may be unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitUser {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl GitUser {
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.email.is_some()
    }
}

/// Which config file a `git config` call reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigScope {
    #[default]
    Any,
    Local,
    Global,
    System,
}

impl ConfigScope {
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            ConfigScope::Any => None,
            ConfigScope::Local => Some("--local"),
            ConfigScope::Global => Some("--global"),
            ConfigScope::System => Some("--system"),
        }
    }
}

/// Result of validating a git installation.
///
/// Versions are reported even when the installation is rejected so callers
/// can tell which minimum failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitInstallValidation {
    pub is_valid: bool,
    pub git_version: Option<Version>,
    pub lfs_version: Option<Version>,
}

impl GitInstallValidation {
    pub fn invalid() -> Self {
        Self::default()
    }
}
