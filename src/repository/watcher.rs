//! Repository file watcher
//!
//! Watches a working tree with notify and classifies changes:
//! - 500ms debounce
//! - noise directories (node_modules, .git/objects, ...) are ignored
//! - changes inside `.git` map to head, index, ref, packed-refs and config events

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("path does not exist: {0}")]
    MissingPath(PathBuf),
    #[error("failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// `.git/HEAD` moved (checkout, detach)
    HeadChanged,
    /// `.git/index` was rewritten (stage, unstage, commit)
    IndexChanged,
    /// Names of local branches whose ref file changed
    LocalBranchesChanged(Vec<String>),
    /// (remote, branch) pairs whose ref file changed
    RemoteBranchesChanged(Vec<(String, String)>),
    ConfigChanged,
    /// `.git/packed-refs` was rewritten (pack-refs, gc, fetch)
    PackedRefsChanged,
    /// Relative paths of changed work tree files
    WorkingTreeChanged(Vec<String>),
}

/// What a single changed path means for the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathKind {
    Head,
    Index,
    LocalRef(String),
    RemoteRef(String, String),
    Config,
    PackedRefs,
    WorkingTree(String),
}

const IGNORE_DIRS: &[&str] = &[
    "node_modules",
    ".git/objects",
    ".git/logs",
    "target",
    "build",
    "dist",
    "__pycache__",
    ".venv",
    "vendor",
];

/// Files under `.git` that carry no state we track.
const GIT_NOISE: &[&str] = &[
    ".git/index.lock",
    ".git/HEAD.lock",
    ".git/config.lock",
    ".git/packed-refs.lock",
];

pub struct RepositoryWatcher {
    watch_path: Option<PathBuf>,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
    event_tx: mpsc::Sender<WatchEvent>,
}

impl RepositoryWatcher {
    pub fn new(event_tx: mpsc::Sender<WatchEvent>) -> Self {
        Self {
            watch_path: None,
            debouncer: None,
            event_tx,
        }
    }

    /// Start watching `path`, replacing any previous watch.
    pub fn watch(&mut self, path: PathBuf) -> Result<(), WatchError> {
        self.unwatch();

        info!("Watching repository: path={}", path.display());

        if !path.exists() {
            return Err(WatchError::MissingPath(path));
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(DEBOUNCE, tx).map_err(|source| WatchError::Notify {
            path: path.clone(),
            source,
        })?;
        debouncer
            .watcher()
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Notify {
                path: path.clone(),
                source,
            })?;

        let event_tx = self.event_tx.clone();
        let root = path.clone();
        std::thread::spawn(move || Self::event_loop(rx, event_tx, root));

        self.watch_path = Some(path);
        self.debouncer = Some(debouncer);
        Ok(())
    }

    pub fn unwatch(&mut self) {
        if let Some(path) = &self.watch_path {
            info!("Stopped watching repository: path={}", path.display());
        }
        // Dropping the debouncer stops the watch and closes the event loop's channel
        self.debouncer = None;
        self.watch_path = None;
    }

    pub fn is_watching(&self) -> bool {
        self.debouncer.is_some()
    }

    pub fn watch_path(&self) -> Option<&Path> {
        self.watch_path.as_deref()
    }

    fn event_loop(
        rx: std::sync::mpsc::Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
        event_tx: mpsc::Sender<WatchEvent>,
        root: PathBuf,
    ) {
        loop {
            match rx.recv() {
                Ok(Ok(events)) => {
                    let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                    for event in Self::classify_batch(&paths, &root) {
                        if let Err(e) = event_tx.blocking_send(event) {
                            warn!("Failed to send watch event: {}", e);
                            return;
                        }
                    }
                }
                Ok(Err(e)) => warn!("Watch error: {}", e),
                Err(_) => {
                    debug!("Watch channel closed, exiting event loop");
                    break;
                }
            }
        }
    }

    /// Fold one debounced batch into at most one event of each kind.
    fn classify_batch(paths: &[PathBuf], root: &Path) -> Vec<WatchEvent> {
        let mut head = false;
        let mut index = false;
        let mut config = false;
        let mut packed = false;
        let mut local = BTreeSet::new();
        let mut remote = BTreeSet::new();
        let mut files = BTreeSet::new();

        for path in paths {
            if Self::should_ignore(path, root) {
                continue;
            }
            match Self::classify(path, root) {
                Some(PathKind::Head) => head = true,
                Some(PathKind::Index) => index = true,
                Some(PathKind::Config) => config = true,
                Some(PathKind::PackedRefs) => packed = true,
                Some(PathKind::LocalRef(name)) => {
                    local.insert(name);
                }
                Some(PathKind::RemoteRef(r, b)) => {
                    remote.insert((r, b));
                }
                Some(PathKind::WorkingTree(rel)) => {
                    files.insert(rel);
                }
                None => {}
            }
        }

        let mut events = Vec::new();
        if config {
            events.push(WatchEvent::ConfigChanged);
        }
        if packed {
            events.push(WatchEvent::PackedRefsChanged);
        }
        if !local.is_empty() {
            events.push(WatchEvent::LocalBranchesChanged(local.into_iter().collect()));
        }
        if !remote.is_empty() {
            events.push(WatchEvent::RemoteBranchesChanged(remote.into_iter().collect()));
        }
        if head {
            events.push(WatchEvent::HeadChanged);
        }
        if index {
            events.push(WatchEvent::IndexChanged);
        }
        if !files.is_empty() {
            events.push(WatchEvent::WorkingTreeChanged(files.into_iter().collect()));
        }
        events
    }

    fn should_ignore(path: &Path, root_path: &Path) -> bool {
        let rel_path = match path.strip_prefix(root_path) {
            Ok(p) => p,
            Err(_) => return false,
        };

        for component in rel_path.components() {
            if let std::path::Component::Normal(name) = component {
                let name_str = name.to_string_lossy();
                if IGNORE_DIRS.iter().any(|d| name_str == *d) {
                    return true;
                }
            }
        }

        let rel_str = rel_path.to_string_lossy().replace('\\', "/");
        IGNORE_DIRS.iter().any(|d| rel_str.starts_with(d)) || GIT_NOISE.contains(&rel_str.as_str())
    }

    fn classify(path: &Path, root_path: &Path) -> Option<PathKind> {
        let rel_path = path.strip_prefix(root_path).ok()?;
        let rel_str = rel_path.to_string_lossy().replace('\\', "/");

        let Some(git_rel) = rel_str.strip_prefix(".git/") else {
            if rel_str == ".git" || rel_str.is_empty() {
                return None;
            }
            return Some(PathKind::WorkingTree(rel_str));
        };

        match git_rel {
            "HEAD" => Some(PathKind::Head),
            "index" => Some(PathKind::Index),
            "config" => Some(PathKind::Config),
            "packed-refs" => Some(PathKind::PackedRefs),
            _ => {
                if let Some(name) = git_rel.strip_prefix("refs/heads/") {
                    return Some(PathKind::LocalRef(name.to_string()));
                }
                let (remote, branch) = git_rel.strip_prefix("refs/remotes/")?.split_once('/')?;
                if branch == "HEAD" {
                    return None;
                }
                Some(PathKind::RemoteRef(remote.to_string(), branch.to_string()))
            }
        }
    }
}

impl Drop for RepositoryWatcher {
    fn drop(&mut self) {
        self.unwatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn root() -> PathBuf {
        PathBuf::from("/project")
    }

    #[test]
    fn test_should_ignore() {
        let root = root();
        assert!(RepositoryWatcher::should_ignore(
            &PathBuf::from("/project/node_modules/foo.js"),
            &root
        ));
        assert!(RepositoryWatcher::should_ignore(
            &PathBuf::from("/project/.git/objects/ab/cd1234"),
            &root
        ));
        assert!(RepositoryWatcher::should_ignore(
            &PathBuf::from("/project/.git/index.lock"),
            &root
        ));
        assert!(!RepositoryWatcher::should_ignore(
            &PathBuf::from("/project/src/main.rs"),
            &root
        ));
        assert!(!RepositoryWatcher::should_ignore(
            &PathBuf::from("/project/.git/index"),
            &root
        ));
    }

    #[test]
    fn test_classify_git_paths() {
        let root = root();
        let kind = |p: &str| RepositoryWatcher::classify(&PathBuf::from(p), &root);
        assert_eq!(kind("/project/.git/HEAD"), Some(PathKind::Head));
        assert_eq!(kind("/project/.git/index"), Some(PathKind::Index));
        assert_eq!(kind("/project/.git/config"), Some(PathKind::Config));
        assert_eq!(kind("/project/.git/packed-refs"), Some(PathKind::PackedRefs));
        assert_eq!(
            kind("/project/.git/refs/heads/feature/login"),
            Some(PathKind::LocalRef("feature/login".into()))
        );
        assert_eq!(
            kind("/project/.git/refs/remotes/origin/main"),
            Some(PathKind::RemoteRef("origin".into(), "main".into()))
        );
        assert_eq!(kind("/project/.git/refs/remotes/origin/HEAD"), None);
        assert_eq!(kind("/project/.git/COMMIT_EDITMSG"), None);
        assert_eq!(
            kind("/project/src/lib.rs"),
            Some(PathKind::WorkingTree("src/lib.rs".into()))
        );
        assert_eq!(kind("/elsewhere/file"), None);
    }

    #[test]
    fn test_classify_batch_folds_duplicates() {
        let paths: Vec<PathBuf> = [
            "/project/.git/index",
            "/project/.git/index",
            "/project/.git/refs/heads/main",
            "/project/.git/objects/aa/bb",
            "/project/a.txt",
            "/project/b.txt",
            "/project/a.txt",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        let events = RepositoryWatcher::classify_batch(&paths, &root());
        assert_eq!(
            events,
            vec![
                WatchEvent::LocalBranchesChanged(vec!["main".into()]),
                WatchEvent::IndexChanged,
                WatchEvent::WorkingTreeChanged(vec!["a.txt".into(), "b.txt".into()]),
            ]
        );
    }

    #[test]
    fn test_classify_batch_reports_packed_refs() {
        let paths: Vec<PathBuf> = [
            "/project/.git/packed-refs.lock",
            "/project/.git/packed-refs",
            "/project/.git/refs/heads/main",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        let events = RepositoryWatcher::classify_batch(&paths, &root());
        assert_eq!(
            events,
            vec![
                WatchEvent::PackedRefsChanged,
                WatchEvent::LocalBranchesChanged(vec!["main".into()]),
            ]
        );
    }

    #[test]
    fn test_missing_path_is_rejected() {
        let (tx, _rx) = mpsc::channel(4);
        let mut watcher = RepositoryWatcher::new(tx);
        let err = watcher
            .watch(PathBuf::from("/definitely/not/a/repo"))
            .unwrap_err();
        assert!(matches!(err, WatchError::MissingPath(_)));
        assert!(!watcher.is_watching());
    }
}
