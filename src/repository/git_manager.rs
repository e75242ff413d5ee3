//! Repository manager backed by a [`GitClient`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::git::{
    packed_ref_names, ConfigBranch, GitClient, GitLock, GitLogEntry, GitStatus, GitUser, RemoteBranchIndex,
    RepositoryConfig,
};
use crate::task::TaskChain;

use super::manager::{RepositoryManager, RepositoryNotification};
use super::watcher::{RepositoryWatcher, WatchError, WatchEvent};

/// Everything one refresh reads.
struct RefreshSnapshot {
    config: RepositoryConfig,
    local: Vec<ConfigBranch>,
    remote: RemoteBranchIndex,
    head: String,
    status: GitStatus,
    user: GitUser,
}

#[derive(Default)]
struct Shared {
    config: RwLock<RepositoryConfig>,
    local_branches: Mutex<BTreeSet<String>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RepositoryNotification>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn publish(&self, notification: RepositoryNotification) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }

    fn config(&self) -> RepositoryConfig {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn set_config(&self, config: RepositoryConfig) {
        match self.config.write() {
            Ok(mut c) => *c = config,
            Err(e) => *e.into_inner() = config,
        }
    }

    /// Config first, so branch and remote lookups made while handling the
    /// head notification see the fresh snapshot.
    fn apply_refresh(&self, snapshot: RefreshSnapshot) {
        self.set_config(snapshot.config);
        let local: BTreeMap<String, ConfigBranch> = snapshot
            .local
            .into_iter()
            .map(|b| (b.name.clone(), b))
            .collect();
        *lock(&self.local_branches) = local.keys().cloned().collect();

        self.publish(RepositoryNotification::LocalBranchListUpdated(local));
        self.publish(RepositoryNotification::RemoteBranchListUpdated(snapshot.remote));
        self.publish(RepositoryNotification::HeadUpdated(snapshot.head));
        self.publish(RepositoryNotification::StatusUpdated(snapshot.status));
        self.publish(RepositoryNotification::UserLoaded(snapshot.user));
    }
}

pub struct GitRepositoryManager {
    client: GitClient,
    shared: Arc<Shared>,
}

impl GitRepositoryManager {
    pub fn new(client: GitClient) -> Self {
        Self {
            client,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn client(&self) -> &GitClient {
        &self.client
    }

    fn git_dir(&self) -> PathBuf {
        self.client.working_dir().join(".git")
    }

    /// Deliver `notification` to every live subscriber, in subscription order.
    pub fn publish(&self, notification: RepositoryNotification) {
        self.shared.publish(notification);
    }

    /// Replace the cached config snapshot without running git.
    pub fn replace_config(&self, config: RepositoryConfig) {
        self.shared.set_config(config);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// Refs recorded in `.git/packed-refs`; empty when the file is absent.
    fn packed_refs(&self) -> BTreeSet<String> {
        match std::fs::read_to_string(self.git_dir().join("packed-refs")) {
            Ok(content) => packed_ref_names(&content),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to read packed-refs: {}", e);
                }
                BTreeSet::new()
            }
        }
    }

    /// Re-read status only.
    pub fn refresh_status(&self) -> TaskChain<()> {
        let shared = self.shared.clone();
        self.client.status().then(move |status| {
            shared.publish(RepositoryNotification::StatusUpdated(status));
            Ok(())
        })
    }

    /// Map a watcher event to notifications, returning the chain to run if
    /// the event needs git to be queried again.
    pub fn handle_watch_event(&self, event: WatchEvent) -> Option<TaskChain<()>> {
        match event {
            WatchEvent::HeadChanged
            | WatchEvent::ConfigChanged
            | WatchEvent::PackedRefsChanged => Some(self.refresh()),
            WatchEvent::IndexChanged | WatchEvent::WorkingTreeChanged(_) => {
                Some(self.refresh_status())
            }
            WatchEvent::LocalBranchesChanged(names) => {
                let refs = self.git_dir().join("refs").join("heads");
                let packed = self.packed_refs();
                for name in names {
                    let exists = refs.join(&name).is_file()
                        || packed.contains(&format!("refs/heads/{}", name));
                    let known = lock(&self.shared.local_branches).contains(&name);
                    let notification = match (exists, known) {
                        (true, true) => RepositoryNotification::LocalBranchCommitChanged(name),
                        (true, false) => {
                            lock(&self.shared.local_branches).insert(name.clone());
                            RepositoryNotification::LocalBranchAdded(name)
                        }
                        (false, true) => {
                            lock(&self.shared.local_branches).remove(&name);
                            RepositoryNotification::LocalBranchRemoved(name)
                        }
                        (false, false) => continue,
                    };
                    self.publish(notification);
                }
                None
            }
            WatchEvent::RemoteBranchesChanged(pairs) => {
                let refs = self.git_dir().join("refs").join("remotes");
                let packed = self.packed_refs();
                for (remote, branch) in pairs {
                    let exists = refs.join(&remote).join(&branch).is_file()
                        || packed.contains(&format!("refs/remotes/{}/{}", remote, branch));
                    let notification = if exists {
                        RepositoryNotification::RemoteBranchAdded { remote, branch }
                    } else {
                        RepositoryNotification::RemoteBranchRemoved { remote, branch }
                    };
                    self.publish(notification);
                }
                None
            }
        }
    }

    /// Watch the working tree and keep subscribers up to date until the
    /// returned handle is dropped. Needs a tokio runtime.
    pub fn watch(self: &Arc<Self>) -> Result<WatchHandle, WatchError> {
        let (tx, mut rx) = mpsc::channel(64);
        let mut watcher = RepositoryWatcher::new(tx);
        watcher.watch(self.client.working_dir().to_path_buf())?;

        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!(?event, "repository watch event");
                let Some(mut chain) = manager.handle_watch_event(event) else {
                    continue;
                };
                match chain.run().await {
                    Ok(outcome) => {
                        if let Some(failure) = outcome.failure() {
                            warn!("refresh after watch event failed: {}", failure);
                        }
                    }
                    Err(e) => warn!("refresh after watch event failed: {}", e),
                }
            }
            debug!("repository watch loop finished");
        });

        info!(path = %self.client.working_dir().display(), "repository manager watching");
        Ok(WatchHandle {
            _watcher: watcher,
            task,
        })
    }
}

/// Keeps a watch alive; dropping it stops the watcher and its task.
pub struct WatchHandle {
    _watcher: RepositoryWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl RepositoryManager for GitRepositoryManager {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<RepositoryNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared.subscribers).push(tx);
        rx
    }

    fn config(&self) -> RepositoryConfig {
        self.shared.config()
    }

    fn default_remote(&self) -> Option<String> {
        Some(self.client.settings().default_remote.clone())
    }

    fn refresh(&self) -> TaskChain<()> {
        let client = &self.client;
        let shared = self.shared.clone();
        let refs = client
            .list_local_branches()
            .join(client.list_remote_branches(), |local, remote| (local, remote));
        let state = client.head().join(client.status(), |head, status| (head, status));
        client
            .list_config()
            .join(refs, |config, refs| (config, refs))
            .join(state, |first, second| (first, second))
            .join(client.get_config_user_and_email(), |rest, user| (rest, user))
            .then(move |(((config, (local, remote)), (head, status)), user)| {
                shared.apply_refresh(RefreshSnapshot {
                    config,
                    local,
                    remote,
                    head,
                    status,
                    user,
                });
                Ok(())
            })
    }

    fn remote_add(&self, name: &str, url: &str) -> TaskChain<()> {
        self.client.remote_add(name, url)
    }

    fn remote_change(&self, name: &str, url: &str) -> TaskChain<()> {
        self.client.remote_change(name, url)
    }

    fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> TaskChain<()> {
        self.client.push(remote, branch, set_upstream)
    }

    fn pull(&self, remote: Option<&str>, branch: Option<&str>) -> TaskChain<()> {
        self.client.pull(remote, branch)
    }

    fn fetch(&self, remote: Option<&str>) -> TaskChain<()> {
        self.client.fetch(remote)
    }

    fn revert(&self, commit: &str) -> TaskChain<()> {
        self.client.revert(commit)
    }

    fn list_locks(&self) -> TaskChain<Vec<GitLock>> {
        let shared = self.shared.clone();
        self.client.list_locks(false).then(move |locks| {
            shared.publish(RepositoryNotification::LocksUpdated(locks.clone()));
            Ok(locks)
        })
    }

    fn lock_file(&self, file: &str) -> TaskChain<GitLock> {
        self.client.lock(file)
    }

    fn unlock_file(&self, file: &str, force: bool) -> TaskChain<()> {
        self.client.unlock(file, force)
    }

    fn commit_all_files(&self, message: &str, body: Option<&str>) -> TaskChain<()> {
        self.client.commit_all(message, body)
    }

    fn commit_files(&self, files: &[String], message: &str, body: Option<&str>) -> TaskChain<()> {
        self.client.add_and_commit(files, message, body)
    }

    fn log(&self, limit: Option<usize>) -> TaskChain<Vec<GitLogEntry>> {
        self.client.log(limit)
    }
}
