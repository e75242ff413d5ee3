//! Git client facade
//!
//! [`GitClient`] turns each git command into a [`TaskChain`]. It holds no
//! mutable state: only the process backend, the git executable, the working
//! directory, settings and a cancellation token shared by every chain it
//! builds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ClientSettings;
use crate::task::{
    OutputInterpreter, ProcessBackend, ProcessInvocation, ProcessTask, TaskChain, TokioProcessBackend,
};

use super::config::RepositoryConfig;
use super::parsers::{
    ConfigListInterpreter, OptionalValueInterpreter, LogInterpreter, StatusInterpreter,
    StringInterpreter, UnitInterpreter, VersionInterpreter, LOG_FORMAT,
};
use super::types::{ConfigScope, GitLogEntry, GitStatus, GitUser};
use super::version::Version;

#[derive(Clone)]
pub struct GitClient {
    backend: Arc<dyn ProcessBackend>,
    git_path: PathBuf,
    working_dir: PathBuf,
    settings: ClientSettings,
    cancel: CancellationToken,
}

impl GitClient {
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        working_dir: impl Into<PathBuf>,
        settings: ClientSettings,
    ) -> Self {
        let git_path = settings
            .git_install_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("git"));
        Self {
            backend,
            git_path,
            working_dir: working_dir.into(),
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Client using the tokio process backend.
    pub fn system(working_dir: impl Into<PathBuf>, settings: ClientSettings) -> Self {
        Self::new(TokioProcessBackend::shared(), working_dir, settings)
    }

    pub fn with_git_path(mut self, git_path: impl Into<PathBuf>) -> Self {
        self.git_path = git_path.into();
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A client for one logical operation: cancelling it leaves the parent alone.
    pub fn scoped(&self) -> Self {
        let mut client = self.clone();
        client.cancel = self.cancel.child_token();
        client
    }

    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn backend(&self) -> Arc<dyn ProcessBackend> {
        self.backend.clone()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every chain built by this client.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn invocation_at<I, S>(&self, program: &Path, args: I) -> ProcessInvocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProcessInvocation::new(program, &self.working_dir).args(args)
    }

    pub(crate) fn task<T, I, S>(
        &self,
        args: I,
        interpreter: impl OutputInterpreter<T> + 'static,
    ) -> ProcessTask<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = self.invocation_at(&self.git_path, args);
        ProcessTask::new(self.backend.clone(), invocation, interpreter)
    }

    /// Run any git command with a caller-supplied interpreter.
    pub fn run_with<T, I, S>(
        &self,
        args: I,
        interpreter: impl OutputInterpreter<T> + 'static,
    ) -> TaskChain<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaskChain::from_process(self.task(args, interpreter), self.cancel.clone())
    }

    pub(crate) fn run_unit<I, S>(&self, args: I) -> TaskChain<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_with(args, UnitInterpreter)
    }

    /// One git invocation per batch of `paths`, in order, stopping at the first failure.
    pub(crate) fn run_batched(&self, prefix: &[&str], paths: &[String]) -> TaskChain<()> {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        TaskChain::batched(paths, self.settings.batch_size, self.cancel.clone(), |batch| {
            let args = prefix
                .iter()
                .cloned()
                .chain(std::iter::once("--".to_string()))
                .chain(batch.iter().cloned());
            self.task(args, UnitInterpreter)
        })
        .then(|_| Ok(()))
    }

    pub fn version(&self) -> TaskChain<Version> {
        self.version_at(&self.git_path)
    }

    /// `git --version` for a specific executable.
    pub fn version_at(&self, git_path: &Path) -> TaskChain<Version> {
        let invocation = self.invocation_at(git_path, ["--version"]);
        TaskChain::from_process(
            ProcessTask::new(self.backend.clone(), invocation, VersionInterpreter),
            self.cancel.clone(),
        )
    }

    pub fn lfs_version(&self) -> TaskChain<Version> {
        self.lfs_version_at(&self.git_path)
    }

    pub fn lfs_version_at(&self, git_path: &Path) -> TaskChain<Version> {
        let invocation = self.invocation_at(git_path, ["lfs", "version"]);
        TaskChain::from_process(
            ProcessTask::new(self.backend.clone(), invocation, VersionInterpreter),
            self.cancel.clone(),
        )
    }

    pub fn init(&self) -> TaskChain<()> {
        self.run_unit(["init"])
    }

    pub fn lfs_install(&self) -> TaskChain<()> {
        self.run_unit(["lfs", "install"])
    }

    pub fn status(&self) -> TaskChain<GitStatus> {
        self.status_with(StatusInterpreter)
    }

    pub fn status_with<T: Send + 'static>(
        &self,
        interpreter: impl OutputInterpreter<T> + 'static,
    ) -> TaskChain<T> {
        self.run_with(
            ["-c", "i18n.logoutputencoding=utf8", "status", "-b", "-u", "--porcelain=v1", "-z"],
            interpreter,
        )
    }

    /// Most recent commits, newest first. `None` uses the configured limit.
    pub fn log(&self, limit: Option<usize>) -> TaskChain<Vec<GitLogEntry>> {
        self.log_with(limit, LogInterpreter)
    }

    pub fn log_with<T: Send + 'static>(
        &self,
        limit: Option<usize>,
        interpreter: impl OutputInterpreter<T> + 'static,
    ) -> TaskChain<T> {
        let limit = limit.unwrap_or(self.settings.log_limit);
        self.run_with(
            [
                "-c".to_string(),
                "i18n.logoutputencoding=utf8".to_string(),
                "log".to_string(),
                format!("--max-count={}", limit),
                LOG_FORMAT.to_string(),
            ],
            interpreter,
        )
    }

    /// Branch and remote sections of the effective config.
    pub fn list_config(&self) -> TaskChain<RepositoryConfig> {
        self.run_with(["config", "--list"], ConfigListInterpreter)
    }

    /// Read one config value; an unset key resolves to `None`.
    pub fn get_config(&self, key: &str, scope: ConfigScope) -> TaskChain<Option<String>> {
        self.get_config_with(key, scope, OptionalValueInterpreter)
    }

    pub fn get_config_with<T: Send + 'static>(
        &self,
        key: &str,
        scope: ConfigScope,
        interpreter: impl OutputInterpreter<T> + 'static,
    ) -> TaskChain<T> {
        let mut args = vec!["config".to_string()];
        args.extend(scope.flag().map(str::to_string));
        args.extend(["--get".to_string(), key.to_string()]);
        self.run_with(args, interpreter)
    }

    pub fn set_config(&self, key: &str, value: &str, scope: ConfigScope) -> TaskChain<()> {
        let mut args = vec!["config".to_string()];
        args.extend(scope.flag().map(str::to_string));
        args.extend([key.to_string(), value.to_string()]);
        self.run_unit(args)
    }

    /// `user.name` then `user.email`, read one after the other.
    ///
    /// A missing or unreadable value leaves a `None` hole instead of failing.
    pub fn get_config_user_and_email(&self) -> TaskChain<GitUser> {
        let email = self.get_config("user.email", ConfigScope::Any);
        self.get_config("user.name", ConfigScope::Any)
            .then_always(|name| Ok(name.ok().flatten()))
            .and_then(move |name| {
                email.then_always(move |email| {
                    Ok(GitUser {
                        name,
                        email: email.ok().flatten(),
                    })
                })
            })
    }

    /// HEAD as `.git/HEAD` spells it: `ref: refs/heads/<name>`, or a commit id
    /// when detached.
    pub fn head(&self) -> TaskChain<String> {
        let detached = self.run_with(["rev-parse", "HEAD"], StringInterpreter);
        let cancel = self.cancel.clone();
        self.run_with(["symbolic-ref", "-q", "HEAD"], OptionalValueInterpreter)
            .and_then(move |symbolic| match symbolic {
                Some(reference) => TaskChain::ready(format!("ref: {}", reference), cancel),
                None => detached.then(|id| Ok(id.trim().to_string())),
            })
    }

    /// Raw stdout of a git command, for one-off queries.
    pub fn raw(&self, args: &[&str]) -> TaskChain<String> {
        self.run_with(args.iter().copied(), StringInterpreter)
    }
}

impl std::fmt::Debug for GitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitClient")
            .field("git_path", &self.git_path)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}
