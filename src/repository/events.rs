//! Publish/subscribe registry for repository events.

use crate::git::{ConfigBranch, ConfigRemote, GitLock, GitStatus, GitUser};

/// Observable changes of a [`Repository`](super::Repository).
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryEvent {
    HeadChanged(String),
    CurrentBranchChanged(Option<ConfigBranch>),
    CurrentRemoteChanged(Option<ConfigRemote>),
    CloneUrlChanged(Option<String>),
    StatusChanged(GitStatus),
    LocksChanged(Vec<GitLock>),
    LocalBranchListChanged,
    RemoteBranchListChanged,
    UserChanged(GitUser),
}

impl RepositoryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryEvent::HeadChanged(_) => "head_changed",
            RepositoryEvent::CurrentBranchChanged(_) => "current_branch_changed",
            RepositoryEvent::CurrentRemoteChanged(_) => "current_remote_changed",
            RepositoryEvent::CloneUrlChanged(_) => "clone_url_changed",
            RepositoryEvent::StatusChanged(_) => "status_changed",
            RepositoryEvent::LocksChanged(_) => "locks_changed",
            RepositoryEvent::LocalBranchListChanged => "local_branch_list_changed",
            RepositoryEvent::RemoteBranchListChanged => "remote_branch_list_changed",
            RepositoryEvent::UserChanged(_) => "user_changed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E) + Send>;

/// Handlers run synchronously on the publisher, in registration order, and
/// must not block.
pub struct EventRegistry<E> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler<E>)>,
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
        }
    }
}

impl<E> EventRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&E) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    pub fn publish(&mut self, event: &E) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<E> std::fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
