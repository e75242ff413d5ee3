//! Scripted process backend for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::outcome::TaskFailure;
use super::process::{ProcessBackend, ProcessError, ProcessInvocation, ProcessOutput, ProcessTask};

#[derive(Default)]
struct Script {
    calls: Vec<ProcessInvocation>,
    by_args: HashMap<Vec<String>, ProcessOutput>,
    by_index: HashMap<usize, ProcessOutput>,
    hanging: Vec<Vec<String>>,
    missing: Vec<String>,
}

/// Records every invocation and answers from a script.
///
/// Unscripted invocations succeed with empty output.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn ProcessBackend> {
        Arc::new(self.clone())
    }

    fn key<I, S>(args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        args.into_iter().map(Into::into).collect()
    }

    /// Answer invocations with exactly these arguments.
    pub fn respond<I, S>(&self, args: I, output: ProcessOutput)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script
            .lock()
            .unwrap()
            .by_args
            .insert(Self::key(args), output);
    }

    /// Answer the n-th invocation (0-based) regardless of its arguments.
    pub fn fail_call(&self, index: usize, output: ProcessOutput) {
        self.script.lock().unwrap().by_index.insert(index, output);
    }

    /// Block invocations with these arguments until cancelled.
    pub fn hang<I, S>(&self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script.lock().unwrap().hanging.push(Self::key(args));
    }

    /// Fail to spawn this program.
    pub fn missing_program(&self, program: &str) {
        self.script
            .lock()
            .unwrap()
            .missing
            .push(program.to_string());
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.invocations().into_iter().map(|i| i.args).collect()
    }

    pub fn invocations(&self) -> Vec<ProcessInvocation> {
        self.script.lock().unwrap().calls.clone()
    }

    /// A process task that yields stdout and fails on non-zero exit.
    pub fn task<I, S>(&self, args: I) -> ProcessTask<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = ProcessInvocation::new("git", std::env::temp_dir()).args(args);
        ProcessTask::new(self.shared(), invocation, stdout_or_failure)
    }
}

fn stdout_or_failure(
    invocation: &ProcessInvocation,
    output: ProcessOutput,
) -> Result<String, TaskFailure> {
    if output.success {
        Ok(output.stdout)
    } else {
        Err(output.into_failure(invocation))
    }
}

#[async_trait]
impl ProcessBackend for ScriptedBackend {
    async fn spawn(
        &self,
        invocation: &ProcessInvocation,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        let (hang, answer) = {
            let mut script = self.script.lock().unwrap();
            let program = invocation.program.display().to_string();
            if script.missing.contains(&program) {
                return Err(ProcessError::Spawn {
                    program,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            let index = script.calls.len();
            script.calls.push(invocation.clone());
            let hang = script.hanging.contains(&invocation.args);
            let answer = script
                .by_index
                .get(&index)
                .or_else(|| script.by_args.get(&invocation.args))
                .cloned()
                .unwrap_or_else(|| ProcessOutput::succeeded(""));
            (hang, answer)
        };

        if hang {
            cancel.cancelled().await;
            return Err(ProcessError::Cancelled);
        }
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }
        Ok(answer)
    }
}
