//! Git installation discovery and validation.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ClientSettings;
use crate::task::{TaskChain, TaskFailure};

use super::client::GitClient;
use super::types::GitInstallValidation;
use super::version::Version;

#[cfg(windows)]
const GIT_EXE: &str = "git.exe";
#[cfg(not(windows))]
const GIT_EXE: &str = "git";

/// Well-known install location for this platform.
fn platform_candidate(settings: &ClientSettings) -> PathBuf {
    if let Some(dir) = &settings.bundled_git_dir {
        let sub = if cfg!(windows) { "cmd" } else { "bin" };
        return dir.join(sub).join(GIT_EXE);
    }
    if cfg!(windows) {
        PathBuf::from(r"C:\Program Files\Git\cmd").join(GIT_EXE)
    } else {
        PathBuf::from("/usr/bin").join(GIT_EXE)
    }
}

/// Locate a git executable: configured path, then the platform candidate,
/// then a `PATH` search. Never fails; `None` means nothing was found.
pub fn discover_git(settings: &ClientSettings) -> Option<PathBuf> {
    if let Some(path) = &settings.git_install_path {
        debug!(path = %path.display(), "using configured git");
        return Some(path.clone());
    }
    let candidate = platform_candidate(settings);
    if candidate.is_file() {
        debug!(path = %candidate.display(), "found git at platform location");
        return Some(candidate);
    }
    which::which("git").ok()
}

/// Whether `found` satisfies `minimum`; absent versions never do.
fn meets(found: &Option<Version>, minimum: &Version) -> bool {
    found.as_ref().map(|v| v >= minimum).unwrap_or(false)
}

impl GitClient {
    /// Run [`discover_git`] on the blocking pool.
    pub fn find_git_installation(&self) -> TaskChain<Option<PathBuf>> {
        let settings = self.settings().clone();
        TaskChain::from_future(self.cancellation_token().clone(), async move {
            tokio::task::spawn_blocking(move || discover_git(&settings))
                .await
                .map_err(|e| TaskFailure::message(format!("git discovery task failed: {}", e)))
        })
    }

    /// Check that `git_path` runs and that both git and git-lfs meet the
    /// configured minimums. Both versions are reported either way.
    pub fn validate_git_install(&self, git_path: &Path) -> TaskChain<GitInstallValidation> {
        if !git_path.is_file() {
            debug!(path = %git_path.display(), "git candidate is not a file");
            return TaskChain::ready(GitInstallValidation::invalid(), self.cancellation_token().clone());
        }

        let min_git = self.settings().minimum_git_version;
        let min_lfs = self.settings().minimum_lfs_version;
        let path = git_path.to_path_buf();
        self.version_at(git_path)
            .join_always(self.lfs_version_at(git_path), move |git, lfs| {
                let git_version = git.ok();
                let lfs_version = lfs.ok();
                let is_valid = meets(&git_version, &min_git) && meets(&lfs_version, &min_lfs);
                info!(
                    path = %path.display(),
                    git = ?git_version.as_ref().map(ToString::to_string),
                    lfs = ?lfs_version.as_ref().map(ToString::to_string),
                    is_valid,
                    "validated git install"
                );
                Ok(GitInstallValidation {
                    is_valid,
                    git_version,
                    lfs_version,
                })
            })
    }
}
