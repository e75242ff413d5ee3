//! Repository state aggregator
//!
//! A [`Repository`] consumes [`RepositoryNotification`]s from its manager,
//! keeps a cached snapshot and republishes [`RepositoryEvent`]s. Derived
//! values (current branch, current remote, clone URL) only produce an event
//! when they actually change.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::git::{
    ConfigBranch, ConfigRemote, GitLock, GitLogEntry, GitStatus, GitUser, RemoteBranchIndex,
};
use crate::task::TaskChain;

use super::events::{EventRegistry, RepositoryEvent, SubscriptionId};
use super::manager::{RepositoryManager, RepositoryNotification};

const HEAD_REF_PREFIX: &str = "ref: refs/heads/";
pub const DEFAULT_REMOTE: &str = "origin";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("repository {0} is not attached to a manager")]
    NotAttached(String),
}

pub struct Repository {
    name: String,
    local_path: PathBuf,
    default_remote: Option<String>,
    clone_url: Option<String>,
    head: Option<String>,
    current_branch: Option<ConfigBranch>,
    current_remote: Option<ConfigRemote>,
    status: Option<GitStatus>,
    locks: Vec<GitLock>,
    local_branches: BTreeMap<String, ConfigBranch>,
    remote_branches: RemoteBranchIndex,
    user: Option<GitUser>,
    events: EventRegistry<RepositoryEvent>,
    manager: Option<Arc<dyn RepositoryManager>>,
    notifications: Option<mpsc::UnboundedReceiver<RepositoryNotification>>,
}

impl Repository {
    pub fn new(name: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            local_path: local_path.into(),
            default_remote: None,
            clone_url: None,
            head: None,
            current_branch: None,
            current_remote: None,
            status: None,
            locks: Vec::new(),
            local_branches: BTreeMap::new(),
            remote_branches: RemoteBranchIndex::new(),
            user: None,
            events: EventRegistry::new(),
            manager: None,
            notifications: None,
        }
    }

    /// Remote preferred when the current branch tracks nothing. Overrides
    /// the manager's default remote.
    pub fn with_default_remote(mut self, remote: impl Into<String>) -> Self {
        self.default_remote = Some(remote.into());
        self
    }

    /// Explicit default remote, else the manager's, else [`DEFAULT_REMOTE`].
    pub fn default_remote(&self) -> String {
        self.default_remote
            .clone()
            .or_else(|| self.manager.as_ref().and_then(|m| m.default_remote()))
            .unwrap_or_else(|| DEFAULT_REMOTE.to_string())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn clone_url(&self) -> Option<&str> {
        self.clone_url.as_deref()
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    pub fn current_branch(&self) -> Option<&ConfigBranch> {
        self.current_branch.as_ref()
    }

    pub fn current_remote(&self) -> Option<&ConfigRemote> {
        self.current_remote.as_ref()
    }

    pub fn status(&self) -> Option<&GitStatus> {
        self.status.as_ref()
    }

    pub fn locks(&self) -> &[GitLock] {
        &self.locks
    }

    pub fn local_branches(&self) -> &BTreeMap<String, ConfigBranch> {
        &self.local_branches
    }

    pub fn remote_branches(&self) -> &RemoteBranchIndex {
        &self.remote_branches
    }

    pub fn user(&self) -> Option<&GitUser> {
        self.user.as_ref()
    }

    /// Register an event handler. Handlers run on the task that processes
    /// notifications and must not block.
    pub fn subscribe(&mut self, handler: impl FnMut(&RepositoryEvent) + Send + 'static) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn is_attached(&self) -> bool {
        self.manager.is_some()
    }

    /// Wire the repository to `manager`, dropping any previous subscription.
    pub fn attach(&mut self, manager: Arc<dyn RepositoryManager>) {
        self.detach();
        info!(repo = %self.name, path = %self.local_path.display(), "attaching repository");
        self.notifications = Some(manager.subscribe());
        self.manager = Some(manager);
    }

    pub fn detach(&mut self) {
        if self.manager.take().is_some() {
            info!(repo = %self.name, "detaching repository");
        }
        self.notifications = None;
    }

    pub fn manager(&self) -> Result<&Arc<dyn RepositoryManager>, RepositoryError> {
        self.manager
            .as_ref()
            .ok_or_else(|| RepositoryError::NotAttached(self.name.clone()))
    }

    /// Wait for the next notification and apply it. Returns false once the
    /// manager is gone or the repository is detached.
    pub async fn process_next(&mut self) -> bool {
        let Some(rx) = self.notifications.as_mut() else {
            return false;
        };
        match rx.recv().await {
            Some(notification) => {
                self.apply(notification);
                true
            }
            None => false,
        }
    }

    /// Apply every notification already queued, without waiting.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Some(notification) = self
            .notifications
            .as_mut()
            .and_then(|rx| rx.try_recv().ok())
        {
            self.apply(notification);
            applied += 1;
        }
        applied
    }

    pub fn apply(&mut self, notification: RepositoryNotification) {
        match notification {
            RepositoryNotification::HeadUpdated(head) => self.on_head_updated(head),
            RepositoryNotification::StatusUpdated(status) => {
                self.status = Some(status.clone());
                self.publish(RepositoryEvent::StatusChanged(status));
            }
            RepositoryNotification::LocksUpdated(locks) => {
                self.locks = locks.clone();
                self.publish(RepositoryEvent::LocksChanged(locks));
            }
            RepositoryNotification::LocalBranchListUpdated(branches) => {
                self.local_branches = branches;
                self.publish(RepositoryEvent::LocalBranchListChanged);
                self.update_current_branch();
            }
            RepositoryNotification::RemoteBranchListUpdated(branches) => {
                self.remote_branches = branches;
                self.publish(RepositoryEvent::RemoteBranchListChanged);
            }
            RepositoryNotification::LocalBranchAdded(name) => self.on_local_branch_added(name),
            RepositoryNotification::LocalBranchRemoved(name) => {
                if self.local_branches.remove(&name).is_some() {
                    self.publish(RepositoryEvent::LocalBranchListChanged);
                    self.update_current_branch();
                }
            }
            RepositoryNotification::RemoteBranchAdded { remote, branch } => {
                let branches = self.remote_branches.entry(remote.clone()).or_default();
                if !branches.contains_key(&branch) {
                    let merge = format!("refs/heads/{}", branch);
                    branches.insert(branch.clone(), ConfigBranch::tracking(branch, remote, merge));
                    self.publish(RepositoryEvent::RemoteBranchListChanged);
                }
            }
            RepositoryNotification::RemoteBranchRemoved { remote, branch } => {
                self.on_remote_branch_removed(&remote, &branch)
            }
            RepositoryNotification::LocalBranchCommitChanged(name) => {
                self.on_branch_commit_changed(&name)
            }
            RepositoryNotification::UserLoaded(user) => {
                self.user = Some(user.clone());
                self.publish(RepositoryEvent::UserChanged(user));
            }
        }
    }

    fn publish(&mut self, event: RepositoryEvent) {
        debug!(repo = %self.name, event = event.kind(), "repository event");
        self.events.publish(&event);
    }

    fn on_head_updated(&mut self, head: String) {
        if self.head.as_deref() == Some(head.as_str()) {
            return;
        }
        self.head = Some(head.clone());
        self.publish(RepositoryEvent::HeadChanged(head));
        self.update_current_branch();
    }

    fn on_local_branch_added(&mut self, name: String) {
        if self.local_branches.contains_key(&name) {
            return;
        }
        let branch = self
            .manager
            .as_ref()
            .and_then(|m| m.config().get_branch(&name).cloned())
            .unwrap_or_else(|| ConfigBranch::bare(name.clone()));
        self.local_branches.insert(name, branch);
        self.publish(RepositoryEvent::LocalBranchListChanged);
        self.update_current_branch();
    }

    fn on_remote_branch_removed(&mut self, remote: &str, branch: &str) {
        let Some(branches) = self.remote_branches.get_mut(remote) else {
            return;
        };
        if branches.remove(branch).is_none() {
            return;
        }
        if branches.is_empty() {
            self.remote_branches.remove(remote);
        }
        self.publish(RepositoryEvent::RemoteBranchListChanged);
    }

    fn on_branch_commit_changed(&mut self, name: &str) {
        if self.current_branch.as_ref().map(|b| b.name.as_str()) != Some(name) {
            return;
        }
        if let Some(head) = self.head.clone() {
            self.publish(RepositoryEvent::HeadChanged(head));
        }
        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let mut refresh = manager.refresh();
                runtime.spawn(async move {
                    if let Err(e) = refresh.run().await {
                        warn!("repository refresh failed: {}", e);
                    }
                });
            }
            Err(_) => warn!(repo = %self.name, "no runtime to refresh repository on"),
        }
    }

    /// Branch named by a symbolic head, if it is a known local branch.
    fn derive_current_branch(&self) -> Option<ConfigBranch> {
        let name = self.head.as_deref()?.strip_prefix(HEAD_REF_PREFIX)?.trim();
        self.local_branches.get(name).cloned()
    }

    /// Tracked remote, then the default remote, then the first configured one.
    fn derive_current_remote(&self) -> Option<ConfigRemote> {
        let config = self.manager.as_ref()?.config();
        self.current_branch
            .as_ref()
            .and_then(|b| b.remote.as_deref())
            .and_then(|r| config.get_remote(r))
            .or_else(|| config.get_remote(&self.default_remote()))
            .or_else(|| config.get_remotes().first())
            .cloned()
    }

    fn update_current_branch(&mut self) {
        let branch = self.derive_current_branch();
        if branch != self.current_branch {
            self.current_branch = branch.clone();
            self.publish(RepositoryEvent::CurrentBranchChanged(branch));
        }
        self.update_current_remote();
    }

    fn update_current_remote(&mut self) {
        let remote = self.derive_current_remote();
        if remote != self.current_remote {
            self.current_remote = remote.clone();
            self.publish(RepositoryEvent::CurrentRemoteChanged(remote));
        }
        let url = self.current_remote.as_ref().map(|r| r.url.clone());
        if url != self.clone_url {
            self.clone_url = url.clone();
            self.publish(RepositoryEvent::CloneUrlChanged(url));
        }
    }

    pub fn refresh(&self) -> Result<TaskChain<()>, RepositoryError> {
        Ok(self.manager()?.refresh())
    }

    pub fn fetch(&self, remote: Option<&str>) -> Result<TaskChain<()>, RepositoryError> {
        Ok(self.manager()?.fetch(remote))
    }

    pub fn pull(&self) -> Result<TaskChain<()>, RepositoryError> {
        Ok(self.manager()?.pull(None, None))
    }

    /// Push the current branch to the current remote.
    pub fn push(&self) -> Result<TaskChain<()>, RepositoryError> {
        let manager = self.manager()?;
        match (&self.current_remote, &self.current_branch) {
            (Some(remote), Some(branch)) => {
                Ok(manager.push(&remote.name, &branch.name, !branch.is_tracking()))
            }
            _ => Ok(manager.push(&self.default_remote(), "HEAD", false)),
        }
    }

    pub fn commit_files(
        &self,
        files: &[String],
        message: &str,
        body: Option<&str>,
    ) -> Result<TaskChain<()>, RepositoryError> {
        Ok(self.manager()?.commit_files(files, message, body))
    }

    pub fn commit_all_files(&self, message: &str, body: Option<&str>) -> Result<TaskChain<()>, RepositoryError> {
        Ok(self.manager()?.commit_all_files(message, body))
    }

    pub fn list_locks(&self) -> Result<TaskChain<Vec<GitLock>>, RepositoryError> {
        Ok(self.manager()?.list_locks())
    }

    pub fn lock_file(&self, file: &str) -> Result<TaskChain<GitLock>, RepositoryError> {
        Ok(self.manager()?.lock_file(file))
    }

    pub fn unlock_file(&self, file: &str, force: bool) -> Result<TaskChain<()>, RepositoryError> {
        Ok(self.manager()?.unlock_file(file, force))
    }

    pub fn log(&self, limit: Option<usize>) -> Result<TaskChain<Vec<GitLogEntry>>, RepositoryError> {
        Ok(self.manager()?.log(limit))
    }
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        self.local_path == other.local_path
    }
}

impl Eq for Repository {}

impl Hash for Repository {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local_path.hash(state);
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("local_path", &self.local_path)
            .field("head", &self.head)
            .field("current_branch", &self.current_branch.as_ref().map(|b| &b.name))
            .field("attached", &self.manager.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientSettings;
    use crate::git::{GitClient, RepositoryConfig};
    use crate::repository::GitRepositoryManager;
    use crate::task::testing::ScriptedBackend;
    use std::collections::hash_map::DefaultHasher;
    use std::sync::Mutex;
    use std::time::Duration;

    const SHA: &str = "3f786850e387550fdab836ed7e6dc881de23001b";

    struct Fixture {
        repo: Repository,
        manager: Arc<GitRepositoryManager>,
        backend: ScriptedBackend,
        events: Arc<Mutex<Vec<RepositoryEvent>>>,
    }

    impl Fixture {
        fn new(config: RepositoryConfig) -> Self {
            Self::with_settings(config, ClientSettings::default())
        }

        fn with_settings(config: RepositoryConfig, settings: ClientSettings) -> Self {
            let backend = ScriptedBackend::new();
            let client = GitClient::new(backend.shared(), "/work/game", settings);
            let manager = Arc::new(GitRepositoryManager::new(client));
            manager.replace_config(config);
            let mut repo = Repository::new("game", "/work/game");
            repo.attach(manager.clone());
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = events.clone();
            repo.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
            Self {
                repo,
                manager,
                backend,
                events,
            }
        }

        fn take_events(&self) -> Vec<RepositoryEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        fn count(&self, kind: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.kind() == kind)
                .count()
        }
    }

    fn branches(list: &[ConfigBranch]) -> BTreeMap<String, ConfigBranch> {
        list.iter().map(|b| (b.name.clone(), b.clone())).collect()
    }

    fn config_with_remotes(remotes: &[(&str, &str)]) -> RepositoryConfig {
        RepositoryConfig::new(
            Vec::new(),
            remotes.iter().map(|(n, u)| ConfigRemote::new(*n, *u)),
        )
    }

    #[test]
    fn test_local_branch_added_is_idempotent() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::LocalBranchAdded("feature".into()));
        f.repo.apply(RepositoryNotification::LocalBranchAdded("feature".into()));
        assert_eq!(f.repo.local_branches().len(), 1);
        assert_eq!(f.repo.local_branches()["feature"], ConfigBranch::bare("feature"));
        assert_eq!(f.count("local_branch_list_changed"), 1);
    }

    #[test]
    fn test_added_branch_takes_config_entry() {
        let config = RepositoryConfig::new(
            [ConfigBranch::tracking("dev", "origin", "refs/heads/dev")],
            [ConfigRemote::new("origin", "git@example.com:game.git")],
        );
        let mut f = Fixture::new(config);
        f.repo.apply(RepositoryNotification::LocalBranchAdded("dev".into()));
        assert!(f.repo.local_branches()["dev"].is_tracking());
    }

    #[test]
    fn test_removing_absent_branch_is_noop() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::LocalBranchListUpdated(branches(&[
            ConfigBranch::bare("main"),
        ])));
        f.take_events();
        f.repo.apply(RepositoryNotification::LocalBranchRemoved("ghost".into()));
        assert!(f.take_events().is_empty());
        assert_eq!(f.repo.local_branches().len(), 1);

        f.repo.apply(RepositoryNotification::LocalBranchRemoved("main".into()));
        assert!(f.repo.local_branches().is_empty());
        assert_eq!(f.take_events(), vec![RepositoryEvent::LocalBranchListChanged]);
    }

    #[test]
    fn test_symbolic_head_resolves_branch() {
        let mut f = Fixture::new(config_with_remotes(&[("origin", "https://example.com/game.git")]));
        f.repo.apply(RepositoryNotification::LocalBranchListUpdated(branches(&[
            ConfigBranch::bare("main"),
        ])));
        f.repo.apply(RepositoryNotification::HeadUpdated("ref: refs/heads/main".into()));
        assert_eq!(f.repo.current_branch(), Some(&ConfigBranch::bare("main")));
        assert_eq!(f.repo.current_remote().map(|r| r.name.as_str()), Some("origin"));
        assert_eq!(f.repo.clone_url(), Some("https://example.com/game.git"));
    }

    #[test]
    fn test_detached_head_has_no_branch() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::LocalBranchListUpdated(branches(&[
            ConfigBranch::bare("main"),
        ])));
        f.repo.apply(RepositoryNotification::HeadUpdated("ref: refs/heads/main".into()));
        f.take_events();
        f.repo.apply(RepositoryNotification::HeadUpdated(SHA.into()));
        assert_eq!(f.repo.current_branch(), None);
        assert_eq!(
            f.take_events(),
            vec![
                RepositoryEvent::HeadChanged(SHA.into()),
                RepositoryEvent::CurrentBranchChanged(None),
            ]
        );
    }

    #[test]
    fn test_same_head_fires_nothing() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::HeadUpdated(SHA.into()));
        f.take_events();
        f.repo.apply(RepositoryNotification::HeadUpdated(SHA.into()));
        assert!(f.take_events().is_empty());
    }

    #[test]
    fn test_remote_prefers_tracking_remote() {
        let mut f = Fixture::new(config_with_remotes(&[
            ("origin", "https://example.com/origin.git"),
            ("fork", "https://example.com/fork.git"),
        ]));
        f.repo.apply(RepositoryNotification::LocalBranchListUpdated(branches(&[
            ConfigBranch::tracking("topic", "fork", "refs/heads/topic"),
        ])));
        f.repo.apply(RepositoryNotification::HeadUpdated("ref: refs/heads/topic".into()));
        assert_eq!(f.repo.current_remote().map(|r| r.name.as_str()), Some("fork"));
    }

    #[test]
    fn test_remote_falls_back_to_origin() {
        let mut f = Fixture::new(config_with_remotes(&[
            ("backup", "https://example.com/backup.git"),
            ("origin", "https://example.com/origin.git"),
        ]));
        f.repo.apply(RepositoryNotification::LocalBranchListUpdated(branches(&[
            ConfigBranch::bare("main"),
        ])));
        f.repo.apply(RepositoryNotification::HeadUpdated("ref: refs/heads/main".into()));
        assert_eq!(f.repo.current_remote().map(|r| r.name.as_str()), Some("origin"));
    }

    #[test]
    fn test_remote_falls_back_to_first_configured() {
        let mut f = Fixture::new(config_with_remotes(&[
            ("backup", "https://example.com/backup.git"),
            ("mirror", "https://example.com/mirror.git"),
        ]));
        f.repo.apply(RepositoryNotification::HeadUpdated(SHA.into()));
        assert_eq!(f.repo.current_remote().map(|r| r.name.as_str()), Some("backup"));
    }

    #[test]
    fn test_configured_default_remote_beats_first_configured() {
        let settings = ClientSettings {
            default_remote: "upstream".to_string(),
            ..ClientSettings::default()
        };
        let mut f = Fixture::with_settings(
            config_with_remotes(&[
                ("backup", "https://example.com/backup.git"),
                ("upstream", "https://example.com/upstream.git"),
            ]),
            settings,
        );
        assert_eq!(f.repo.default_remote(), "upstream");
        f.repo.apply(RepositoryNotification::HeadUpdated(SHA.into()));
        assert_eq!(f.repo.current_remote().map(|r| r.name.as_str()), Some("upstream"));
        assert_eq!(f.repo.clone_url(), Some("https://example.com/upstream.git"));
    }

    #[test]
    fn test_explicit_default_remote_overrides_manager() {
        let f = Fixture::new(RepositoryConfig::default());
        let repo = Repository::new("game", "/work/game").with_default_remote("fork");
        assert_eq!(repo.default_remote(), "fork");
        let mut detached = Repository::new("game", "/work/game");
        assert_eq!(detached.default_remote(), DEFAULT_REMOTE);
        detached.attach(f.manager.clone());
        assert_eq!(detached.default_remote(), "origin");
    }

    #[test]
    fn test_no_remotes_means_no_remote() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::HeadUpdated(SHA.into()));
        assert_eq!(f.repo.current_remote(), None);
        assert_eq!(f.count("current_remote_changed"), 0);
    }

    #[test]
    fn test_branch_list_update_rederives_branch() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::HeadUpdated("ref: refs/heads/main".into()));
        assert_eq!(f.repo.current_branch(), None);
        f.repo.apply(RepositoryNotification::LocalBranchAdded("main".into()));
        assert_eq!(f.repo.current_branch().map(|b| b.name.as_str()), Some("main"));
    }

    #[test]
    fn test_status_and_locks_always_publish() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::StatusUpdated(GitStatus::default()));
        f.repo.apply(RepositoryNotification::StatusUpdated(GitStatus::default()));
        f.repo.apply(RepositoryNotification::LocksUpdated(Vec::new()));
        f.repo.apply(RepositoryNotification::LocksUpdated(Vec::new()));
        assert_eq!(f.count("status_changed"), 2);
        assert_eq!(f.count("locks_changed"), 2);
        assert!(f.repo.status().is_some());
    }

    #[test]
    fn test_remote_branch_updates() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::RemoteBranchListUpdated(RemoteBranchIndex::new()));
        f.repo.apply(RepositoryNotification::RemoteBranchListUpdated(RemoteBranchIndex::new()));
        assert_eq!(f.count("remote_branch_list_changed"), 2);
        f.take_events();

        let added = RepositoryNotification::RemoteBranchAdded {
            remote: "origin".into(),
            branch: "main".into(),
        };
        f.repo.apply(added.clone());
        f.repo.apply(added);
        assert_eq!(f.count("remote_branch_list_changed"), 1);
        assert!(f.repo.remote_branches()["origin"].contains_key("main"));
    }

    #[test]
    fn test_remote_branch_removal_leaves_local_index() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::LocalBranchAdded("main".into()));
        f.repo.apply(RepositoryNotification::RemoteBranchAdded {
            remote: "origin".into(),
            branch: "main".into(),
        });
        f.take_events();
        f.repo.apply(RepositoryNotification::RemoteBranchRemoved {
            remote: "origin".into(),
            branch: "main".into(),
        });
        assert!(f.repo.remote_branches().is_empty());
        assert!(f.repo.local_branches().contains_key("main"));
        assert_eq!(f.take_events(), vec![RepositoryEvent::RemoteBranchListChanged]);
    }

    #[tokio::test]
    async fn test_commit_on_current_branch_refreshes() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.repo.apply(RepositoryNotification::LocalBranchAdded("main".into()));
        f.repo.apply(RepositoryNotification::HeadUpdated("ref: refs/heads/main".into()));
        f.take_events();

        f.repo.apply(RepositoryNotification::LocalBranchCommitChanged("other".into()));
        assert!(f.take_events().is_empty());

        f.repo.apply(RepositoryNotification::LocalBranchCommitChanged("main".into()));
        assert_eq!(
            f.take_events(),
            vec![RepositoryEvent::HeadChanged("ref: refs/heads/main".into())]
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!f.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_flow_from_manager() {
        let mut f = Fixture::new(RepositoryConfig::default());
        f.manager.publish(RepositoryNotification::UserLoaded(GitUser {
            name: Some("Ada".into()),
            email: None,
        }));
        assert!(f.repo.process_next().await);
        assert_eq!(f.repo.user().and_then(|u| u.name.as_deref()), Some("Ada"));

        f.manager.publish(RepositoryNotification::LocalBranchAdded("a".into()));
        f.manager.publish(RepositoryNotification::LocalBranchAdded("b".into()));
        assert_eq!(f.repo.drain(), 2);
    }

    #[test]
    fn test_reattach_drops_old_subscription() {
        let mut f = Fixture::new(RepositoryConfig::default());
        let other = Arc::new(GitRepositoryManager::new(GitClient::new(
            f.backend.shared(),
            "/work/game",
            ClientSettings::default(),
        )));
        f.repo.attach(other.clone());
        f.manager.publish(RepositoryNotification::LocalBranchAdded("stale".into()));
        other.publish(RepositoryNotification::LocalBranchAdded("fresh".into()));
        assert_eq!(f.repo.drain(), 1);
        assert!(f.repo.local_branches().contains_key("fresh"));
    }

    #[test]
    fn test_detached_repository_cannot_forward() {
        let repo = Repository::new("game", "/work/game");
        assert_eq!(
            repo.refresh().unwrap_err(),
            RepositoryError::NotAttached("game".into())
        );
    }

    #[test]
    fn test_equality_by_local_path() {
        fn hash(repo: &Repository) -> u64 {
            let mut h = DefaultHasher::new();
            repo.hash(&mut h);
            h.finish()
        }

        let mut a = Repository::new("game", "/work/game");
        let mut b = Repository::new("game-copy", "/work/game");
        a.apply(RepositoryNotification::HeadUpdated(SHA.into()));
        a.clone_url = Some("https://example.com/a.git".into());
        b.clone_url = Some("https://example.com/b.git".into());
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
        assert_ne!(a, Repository::new("game", "/work/other"));
    }
}
