//! Remote synchronisation: fetch, pull, push and revert.

use crate::task::TaskChain;

use super::client::GitClient;

impl GitClient {
    /// `git fetch --prune`, from one remote or all of them.
    pub fn fetch(&self, remote: Option<&str>) -> TaskChain<()> {
        self.run_unit(["fetch", "--prune", remote.unwrap_or("--all")])
    }

    /// Pull `branch` from `remote`; both default to the upstream when omitted.
    pub fn pull(&self, remote: Option<&str>, branch: Option<&str>) -> TaskChain<()> {
        let mut args = vec!["pull", "--no-edit"];
        args.extend(remote);
        if remote.is_some() {
            args.extend(branch);
        }
        self.run_unit(args)
    }

    /// Push `branch` to `remote`, recording it as upstream when asked.
    pub fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> TaskChain<()> {
        let mut args = vec!["push"];
        if set_upstream {
            args.push("--set-upstream");
        }
        args.extend([remote, branch]);
        self.run_unit(args)
    }

    /// Create a commit undoing `commit`.
    pub fn revert(&self, commit: &str) -> TaskChain<()> {
        self.run_unit(["revert", "--no-edit", commit])
    }
}
