//! Git LFS file locks.

use crate::task::TaskChain;

use super::client::GitClient;
use super::parsers::{LockInterpreter, LocksInterpreter};
use super::types::GitLock;

impl GitClient {
    /// Current locks. `local` reads the cached list without contacting the server.
    pub fn list_locks(&self, local: bool) -> TaskChain<Vec<GitLock>> {
        let mut args = vec!["lfs", "locks", "--json"];
        if local {
            args.push("--local");
        }
        self.run_with(args, LocksInterpreter)
    }

    pub fn lock(&self, file: &str) -> TaskChain<GitLock> {
        self.run_with(["lfs", "lock", "--json", file], LockInterpreter)
    }

    /// Release a lock; `force` also breaks locks held by someone else.
    pub fn unlock(&self, file: &str, force: bool) -> TaskChain<()> {
        let mut args = vec!["lfs", "unlock"];
        if force {
            args.push("--force");
        }
        args.push(file);
        self.run_unit(args)
    }
}
