//! Staging and committing
//!
//! Path-taking commands are split into batches of `settings.batch_size`
//! paths so a large change set never exceeds the command line limit.

use crate::task::TaskChain;

use super::client::GitClient;

impl GitClient {
    /// Stage `files`, one `git add` per batch.
    pub fn add(&self, files: &[String]) -> TaskChain<()> {
        self.run_batched(&["add"], files)
    }

    pub fn add_all(&self) -> TaskChain<()> {
        self.run_unit(["add", "-A"])
    }

    /// Throw away work tree changes to `files`.
    pub fn discard(&self, files: &[String]) -> TaskChain<()> {
        self.run_batched(&["checkout"], files)
    }

    pub fn discard_all(&self) -> TaskChain<()> {
        self.run_unit(["checkout", "--", "."])
    }

    /// Restore `files` as they were at `commit`.
    pub fn checkout_version(&self, commit: &str, files: &[String]) -> TaskChain<()> {
        self.run_batched(&["checkout", commit], files)
    }

    /// Delete `files` from the index and the work tree.
    pub fn remove(&self, files: &[String]) -> TaskChain<()> {
        self.run_batched(&["rm"], files)
    }

    /// Commit what is staged. An empty body adds no second paragraph.
    pub fn commit(&self, message: &str, body: Option<&str>) -> TaskChain<()> {
        let mut args = vec!["commit", "-m", message];
        if let Some(body) = body.filter(|b| !b.trim().is_empty()) {
            args.extend(["-m", body]);
        }
        self.run_unit(args)
    }

    /// Stage `files` and commit them; the commit only runs if every batch staged.
    pub fn add_and_commit(&self, files: &[String], message: &str, body: Option<&str>) -> TaskChain<()> {
        self.add(files).then_chain(self.commit(message, body))
    }

    /// Stage everything, then commit.
    pub fn commit_all(&self, message: &str, body: Option<&str>) -> TaskChain<()> {
        self.add_all().then_chain(self.commit(message, body))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ClientSettings;
    use crate::git::GitClient;
    use crate::task::testing::ScriptedBackend;
    use crate::task::{ChainState, ProcessOutput};

    fn client(backend: &ScriptedBackend, batch_size: usize) -> GitClient {
        let settings = ClientSettings::default().with_batch_size(batch_size);
        GitClient::new(backend.shared(), "/repo", settings)
    }

    fn paths(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("assets/file_{:05}.bin", i)).collect()
    }

    #[tokio::test]
    async fn test_add_splits_into_batches() {
        let backend = ScriptedBackend::new();
        client(&backend, 5000).add(&paths(12_000)).run().await.unwrap();
        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(&calls[0][..2], &["add", "--"]);
        assert_eq!(calls[0].len(), 5002);
        assert_eq!(calls[2].len(), 2002);
        assert_eq!(calls[1][2], "assets/file_05000.bin");
    }

    #[tokio::test]
    async fn test_failed_batch_stops_add_and_commit() {
        let backend = ScriptedBackend::new();
        backend.fail_call(1, ProcessOutput::failed(128, "fatal: Unable to create index.lock"));
        let mut chain = client(&backend, 5000).add_and_commit(&paths(12_000), "Import", None);
        let outcome = chain.run().await.unwrap();
        assert_eq!(outcome.state(), ChainState::Failed);
        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c[0] == "add"));
    }

    #[tokio::test]
    async fn test_add_and_commit_runs_commit_last() {
        let backend = ScriptedBackend::new();
        client(&backend, 2)
            .add_and_commit(&paths(3), "Add files", Some("Longer description"))
            .run()
            .await
            .unwrap();
        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2],
            vec!["commit", "-m", "Add files", "-m", "Longer description"]
        );
    }

    #[tokio::test]
    async fn test_checkout_version_and_blank_body() {
        let backend = ScriptedBackend::new();
        let client = client(&backend, 10);
        client
            .checkout_version("abc123", &["a.txt".to_string()])
            .run()
            .await
            .unwrap();
        client.commit("Fix", Some("  ")).run().await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                vec!["checkout", "abc123", "--", "a.txt"],
                vec!["commit", "-m", "Fix"],
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_discard_spawns_nothing() {
        let backend = ScriptedBackend::new();
        let outcome = client(&backend, 10).discard(&[]).run().await.unwrap();
        assert!(outcome.is_success());
        assert!(backend.calls().is_empty());
    }
}
