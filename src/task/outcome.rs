//! Chain states, terminal outcomes and the error taxonomy.

use thiserror::Error;

/// Completion state of a single chain node.
///
/// States only move forward: `Pending -> Running -> {Succeeded, Failed, Cancelled}`,
/// or `Pending` straight to a terminal state when the node is short-circuited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ChainState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChainState::Succeeded | ChainState::Failed | ChainState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` keeps the state machine monotonic.
    pub fn can_transition_to(self, next: ChainState) -> bool {
        match self {
            ChainState::Pending => next != ChainState::Pending,
            ChainState::Running => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainState::Pending => "pending",
            ChainState::Running => "running",
            ChainState::Succeeded => "succeeded",
            ChainState::Failed => "failed",
            ChainState::Cancelled => "cancelled",
        }
    }
}

/// Why a chain node failed.
#[derive(Error, Debug)]
pub enum TaskFailure {
    /// The executable could not be launched at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but reported failure. Output is kept for diagnostics.
    #[error("`{command}` exited with {}: {}", exit_label(.code), .stderr.trim())]
    Command {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The output interpreter could not make sense of the process output.
    #[error("could not interpret output: {0}")]
    Parse(String),

    /// A continuation produced a value of an unexpected type.
    #[error("chain value type mismatch, expected {0}")]
    TypeMismatch(&'static str),

    #[error("{0}")]
    Message(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "signal".to_string(),
    }
}

impl TaskFailure {
    pub fn message(msg: impl Into<String>) -> Self {
        TaskFailure::Message(msg.into())
    }

    /// Partial stdout captured from a failed command, if any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            TaskFailure::Command { stdout, .. } => Some(stdout.as_str()),
            _ => None,
        }
    }
}

/// Fatal misuse of a chain instance.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("chain has already been started")]
    AlreadyStarted,

    #[error("chain task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Terminal result of running a chain.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Succeeded(T),
    Failed(TaskFailure),
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn state(&self) -> ChainState {
        match self {
            TaskOutcome::Succeeded(_) => ChainState::Succeeded,
            TaskOutcome::Failed(_) => ChainState::Failed,
            TaskOutcome::Cancelled => ChainState::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }

    pub fn ok(self) -> Option<T> {
        match self {
            TaskOutcome::Succeeded(v) => Some(v),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskOutcome<U> {
        match self {
            TaskOutcome::Succeeded(v) => TaskOutcome::Succeeded(f(v)),
            TaskOutcome::Failed(e) => TaskOutcome::Failed(e),
            TaskOutcome::Cancelled => TaskOutcome::Cancelled,
        }
    }
}

impl<T> From<Result<T, TaskFailure>> for TaskOutcome<T> {
    fn from(result: Result<T, TaskFailure>) -> Self {
        match result {
            Ok(v) => TaskOutcome::Succeeded(v),
            Err(e) => TaskOutcome::Failed(e),
        }
    }
}
