//! Process tasks: one external executable invocation with a typed result.
//!
//! The backend owns the actual spawning. [`TokioProcessBackend`] shells out
//! with `tokio::process::Command` and kills the child when the cancellation
//! token fires.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::outcome::{TaskFailure, TaskOutcome};

/// Everything needed to launch one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human readable command line, used in logs and failure messages.
    pub fn command_line(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string());
        if self.args.is_empty() {
            program
        } else {
            format!("{} {}", program, self.args.join(" "))
        }
    }
}

impl fmt::Display for ProcessInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Raw result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Turn a non-zero exit into a command failure that keeps the output.
    pub fn into_failure(self, invocation: &ProcessInvocation) -> TaskFailure {
        TaskFailure::Command {
            command: invocation.command_line(),
            code: self.code,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process cancelled")]
    Cancelled,
}

/// Spawns external processes on behalf of chain nodes.
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    async fn spawn(
        &self,
        invocation: &ProcessInvocation,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, ProcessError>;
}

/// Production backend built on `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct TokioProcessBackend;

impl TokioProcessBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> Arc<dyn ProcessBackend> {
        Arc::new(Self)
    }
}

#[async_trait]
impl ProcessBackend for TokioProcessBackend {
    #[instrument(skip(self, cancel), fields(cmd = %invocation))]
    async fn spawn(
        &self,
        invocation: &ProcessInvocation,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &invocation.env {
            cmd.env(k, v);
        }

        debug!("spawning process");

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: invocation.program.display().to_string(),
            source,
        })?;

        tokio::select! {
            result = child.wait_with_output() => {
                let output = result.map_err(|source| ProcessError::Spawn {
                    program: invocation.program.display().to_string(),
                    source,
                })?;
                let out = ProcessOutput {
                    success: output.status.success(),
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };
                if !out.success {
                    debug!(code = ?out.code, "process exited with failure");
                }
                Ok(out)
            }
            _ = cancel.cancelled() => {
                // Dropping the wait future drops the child, and kill_on_drop reaps it.
                warn!("process cancelled, killing child");
                Err(ProcessError::Cancelled)
            }
        }
    }
}

/// Turns raw process output into a typed value.
pub trait OutputInterpreter<T>: Send + Sync {
    fn interpret(
        &self,
        invocation: &ProcessInvocation,
        output: ProcessOutput,
    ) -> Result<T, TaskFailure>;
}

impl<T, F> OutputInterpreter<T> for F
where
    F: Fn(&ProcessInvocation, ProcessOutput) -> Result<T, TaskFailure> + Send + Sync,
{
    fn interpret(
        &self,
        invocation: &ProcessInvocation,
        output: ProcessOutput,
    ) -> Result<T, TaskFailure> {
        self(invocation, output)
    }
}

/// A single external process plus the interpreter for its output.
pub struct ProcessTask<T> {
    invocation: ProcessInvocation,
    interpreter: Box<dyn OutputInterpreter<T>>,
    backend: Arc<dyn ProcessBackend>,
}

impl<T: Send + 'static> ProcessTask<T> {
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        invocation: ProcessInvocation,
        interpreter: impl OutputInterpreter<T> + 'static,
    ) -> Self {
        Self {
            invocation,
            interpreter: Box::new(interpreter),
            backend,
        }
    }

    pub fn invocation(&self) -> &ProcessInvocation {
        &self.invocation
    }

    /// Run the process to completion, honouring `cancel`.
    pub async fn run(self, cancel: CancellationToken) -> TaskOutcome<T> {
        if cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }
        match self.backend.spawn(&self.invocation, cancel.clone()).await {
            Ok(_) if cancel.is_cancelled() => TaskOutcome::Cancelled,
            Ok(output) => self.interpreter.interpret(&self.invocation, output).into(),
            Err(ProcessError::Cancelled) => TaskOutcome::Cancelled,
            Err(ProcessError::Spawn { program, source }) => {
                TaskOutcome::Failed(TaskFailure::Spawn { program, source })
            }
        }
    }
}

impl<T> fmt::Debug for ProcessTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessTask")
            .field("invocation", &self.invocation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdout(_: &ProcessInvocation, out: ProcessOutput) -> Result<String, TaskFailure> {
        Ok(out.stdout)
    }

    #[test]
    fn test_command_line_uses_program_file_name() {
        let inv = ProcessInvocation::new("/usr/bin/git", "/tmp").args(["status", "-z"]);
        assert_eq!(inv.command_line(), "git status -z");
    }

    #[test]
    fn test_into_failure_preserves_output() {
        let inv = ProcessInvocation::new("git", "/tmp").arg("push");
        let mut out = ProcessOutput::failed(128, "rejected");
        out.stdout = "half".to_string();
        match out.into_failure(&inv) {
            TaskFailure::Command { code, stdout, stderr, .. } => {
                assert_eq!(code, Some(128));
                assert_eq!(stdout, "half");
                assert_eq!(stderr, "rejected");
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_is_spawn_failure() {
        let backend = TokioProcessBackend::shared();
        let inv = ProcessInvocation::new("/definitely/not/a/real/git-binary", std::env::temp_dir());
        let task = ProcessTask::new(backend, inv, stdout);
        let outcome = task.run(CancellationToken::new()).await;
        assert!(matches!(outcome, TaskOutcome::Failed(TaskFailure::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_spawns() {
        let backend = TokioProcessBackend::shared();
        let inv = ProcessInvocation::new("/definitely/not/a/real/git-binary", std::env::temp_dir());
        let task = ProcessTask::new(backend, inv, stdout);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(task.run(cancel).await.is_cancelled());
    }
}
