// Repository module - state aggregation over manager notifications
//
// - events: RepositoryEvent and the publish/subscribe registry
// - manager: the RepositoryManager seam and its notifications
// - state: the Repository aggregator
// - watcher: debounced filesystem watch over a working tree
// - git_manager: RepositoryManager implementation driven by GitClient

pub mod events;
pub mod git_manager;
pub mod manager;
pub mod state;
pub mod watcher;

pub use events::{EventRegistry, RepositoryEvent, SubscriptionId};
pub use git_manager::{GitRepositoryManager, WatchHandle};
pub use manager::{RepositoryManager, RepositoryNotification};
pub use state::{Repository, RepositoryError, DEFAULT_REMOTE};
pub use watcher::{RepositoryWatcher, WatchError, WatchEvent};
