//! Branch and remote management
//!
//! Branch listings come from `git for-each-ref`. Local branches are joined
//! with the config listing so each record carries its tracking information.

use crate::task::TaskChain;

use super::client::GitClient;
use super::config::ConfigBranch;
use super::parsers::{remote_branch_index, RefNamesInterpreter, RemoteBranchIndex};

impl GitClient {
    /// Local branches with their tracking configuration.
    ///
    /// Uses:
    /// - `git for-each-ref refs/heads --format=%(refname:short)` for the names
    /// - `git config --list` for `branch.<name>.remote` / `.merge`
    pub fn list_local_branches(&self) -> TaskChain<Vec<ConfigBranch>> {
        let names = self.run_with(
            ["for-each-ref", "refs/heads", "--format=%(refname:short)"],
            RefNamesInterpreter,
        );
        names.join(self.list_config(), |names, config| {
            names
                .into_iter()
                .map(|name| {
                    config
                        .get_branch(&name)
                        .cloned()
                        .unwrap_or_else(|| ConfigBranch::bare(name))
                })
                .collect()
        })
    }

    /// Remote-tracking branches grouped by remote.
    pub fn list_remote_branches(&self) -> TaskChain<RemoteBranchIndex> {
        self.run_with(
            ["for-each-ref", "refs/remotes", "--format=%(refname:short)"],
            RefNamesInterpreter,
        )
        .then(|names| Ok(remote_branch_index(&names)))
    }

    /// Check out an existing branch.
    ///
    /// `git switch` needs 2.23, so `checkout` keeps the minimum version usable.
    pub fn switch_branch(&self, name: &str) -> TaskChain<()> {
        self.run_unit(["checkout", name])
    }

    /// Create a branch at HEAD, optionally switching to it.
    pub fn create_branch(&self, name: &str, switch: bool) -> TaskChain<()> {
        if switch {
            self.run_unit(["checkout", "-b", name])
        } else {
            self.run_unit(["branch", name])
        }
    }

    pub fn delete_branch(&self, name: &str, force: bool) -> TaskChain<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run_unit(["branch", flag, name])
    }

    pub fn remote_add(&self, name: &str, url: &str) -> TaskChain<()> {
        self.run_unit(["remote", "add", name, url])
    }

    pub fn remote_remove(&self, name: &str) -> TaskChain<()> {
        self.run_unit(["remote", "remove", name])
    }

    /// Point an existing remote at a new URL.
    pub fn remote_change(&self, name: &str, url: &str) -> TaskChain<()> {
        self.run_unit(["remote", "set-url", name, url])
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ClientSettings;
    use crate::git::GitClient;
    use crate::task::testing::ScriptedBackend;
    use crate::task::{ChainState, ProcessOutput};

    fn client(backend: &ScriptedBackend) -> GitClient {
        GitClient::new(backend.shared(), "/repo", ClientSettings::default())
    }

    #[tokio::test]
    async fn test_local_branches_carry_tracking() {
        let backend = ScriptedBackend::new();
        backend.respond(
            ["for-each-ref", "refs/heads", "--format=%(refname:short)"],
            ProcessOutput::succeeded("main\nspike\n"),
        );
        backend.respond(
            ["config", "--list"],
            ProcessOutput::succeeded(
                "branch.main.remote=origin\nbranch.main.merge=refs/heads/main\n",
            ),
        );
        let branches = client(&backend)
            .list_local_branches()
            .run()
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].upstream().as_deref(), Some("origin/main"));
        assert!(!branches[1].is_tracking());
    }

    #[tokio::test]
    async fn test_remote_branches_grouped() {
        let backend = ScriptedBackend::new();
        backend.respond(
            ["for-each-ref", "refs/remotes", "--format=%(refname:short)"],
            ProcessOutput::succeeded("origin\norigin/main\nupstream/dev\n"),
        );
        let index = client(&backend)
            .list_remote_branches()
            .run()
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["origin", "upstream"]);
        assert!(index["upstream"].contains_key("dev"));
    }

    #[tokio::test]
    async fn test_branch_commands() {
        let backend = ScriptedBackend::new();
        let client = client(&backend);
        client.create_branch("topic", true).run().await.unwrap();
        client.create_branch("other", false).run().await.unwrap();
        client.delete_branch("other", true).run().await.unwrap();
        client.remote_change("origin", "git@example.com:x.git").run().await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                vec!["checkout", "-b", "topic"],
                vec!["branch", "other"],
                vec!["branch", "-D", "other"],
                vec!["remote", "set-url", "origin", "git@example.com:x.git"],
            ]
        );
    }

    #[tokio::test]
    async fn test_switch_failure_keeps_stderr() {
        let backend = ScriptedBackend::new();
        backend.respond(
            ["checkout", "nope"],
            ProcessOutput::failed(1, "error: pathspec 'nope' did not match"),
        );
        let mut chain = client(&backend).switch_branch("nope");
        let outcome = chain.run().await.unwrap();
        assert_eq!(chain.state(), ChainState::Failed);
        assert!(outcome
            .failure()
            .map(|f| f.to_string().contains("pathspec"))
            .unwrap_or(false));
    }
}
