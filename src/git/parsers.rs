//! Output interpreters, one per command family.
//!
//! Every interpreter treats a non-zero exit as a command failure that keeps
//! the process output, except [`OptionalValueInterpreter`] which maps git's
//! "not set" exit code to `None`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;

use crate::task::{OutputInterpreter, ProcessInvocation, ProcessOutput, TaskFailure};

use super::config::{ConfigBranch, RepositoryConfig};
use super::status::parse_porcelain_status;
use super::types::{GitLock, GitLogEntry, GitStatus};
use super::version::Version;

/// Field and record separators used in the `git log` format string.
pub const LOG_FIELD_SEP: char = '\u{1f}';
pub const LOG_RECORD_SEP: char = '\u{1e}';
pub const LOG_FORMAT: &str = "--pretty=format:%H%x1f%an%x1f%ae%x1f%aI%x1f%s%x1f%b%x1e";

/// Remote branch index: remote name -> branch name -> branch record.
pub type RemoteBranchIndex = BTreeMap<String, BTreeMap<String, ConfigBranch>>;

fn require_success(
    invocation: &ProcessInvocation,
    output: ProcessOutput,
) -> Result<String, TaskFailure> {
    if output.success {
        Ok(output.stdout)
    } else {
        Err(output.into_failure(invocation))
    }
}

/// Raw stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringInterpreter;

impl OutputInterpreter<String> for StringInterpreter {
    fn interpret(&self, inv: &ProcessInvocation, out: ProcessOutput) -> Result<String, TaskFailure> {
        require_success(inv, out)
    }
}

/// Success flag only.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitInterpreter;

impl OutputInterpreter<()> for UnitInterpreter {
    fn interpret(&self, inv: &ProcessInvocation, out: ProcessOutput) -> Result<(), TaskFailure> {
        require_success(inv, out).map(|_| ())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StatusInterpreter;

impl OutputInterpreter<GitStatus> for StatusInterpreter {
    fn interpret(&self, inv: &ProcessInvocation, out: ProcessOutput) -> Result<GitStatus, TaskFailure> {
        require_success(inv, out).map(|s| parse_porcelain_status(&s))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogInterpreter;

impl LogInterpreter {
    fn parse_record(record: &str) -> Result<GitLogEntry, TaskFailure> {
        let fields: Vec<&str> = record.splitn(6, LOG_FIELD_SEP).collect();
        if fields.len() < 6 {
            return Err(TaskFailure::Parse(format!(
                "log record has {} fields, expected 6",
                fields.len()
            )));
        }
        let time = DateTime::parse_from_rfc3339(fields[3])
            .map_err(|e| TaskFailure::Parse(format!("bad commit date '{}': {}", fields[3], e)))?;
        Ok(GitLogEntry {
            commit_id: fields[0].to_string(),
            author_name: fields[1].to_string(),
            author_email: fields[2].to_string(),
            time,
            summary: fields[4].to_string(),
            body: fields[5].trim().to_string(),
        })
    }
}

impl OutputInterpreter<Vec<GitLogEntry>> for LogInterpreter {
    fn interpret(
        &self,
        inv: &ProcessInvocation,
        out: ProcessOutput,
    ) -> Result<Vec<GitLogEntry>, TaskFailure> {
        let stdout = require_success(inv, out)?;
        stdout
            .split(LOG_RECORD_SEP)
            .map(|r| r.trim_start_matches('\n'))
            .filter(|r| !r.trim().is_empty())
            .map(Self::parse_record)
            .collect()
    }
}

/// `git lfs locks --json`
#[derive(Debug, Default, Clone, Copy)]
pub struct LocksInterpreter;

impl OutputInterpreter<Vec<GitLock>> for LocksInterpreter {
    fn interpret(
        &self,
        inv: &ProcessInvocation,
        out: ProcessOutput,
    ) -> Result<Vec<GitLock>, TaskFailure> {
        let stdout = require_success(inv, out)?;
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&stdout).map_err(|e| TaskFailure::Parse(e.to_string()))
    }
}

/// `git lfs lock --json`, a single lock record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LockInterpreter;

impl OutputInterpreter<GitLock> for LockInterpreter {
    fn interpret(&self, inv: &ProcessInvocation, out: ProcessOutput) -> Result<GitLock, TaskFailure> {
        let stdout = require_success(inv, out)?;
        serde_json::from_str(stdout.trim()).map_err(|e| TaskFailure::Parse(e.to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VersionInterpreter;

impl OutputInterpreter<Version> for VersionInterpreter {
    fn interpret(&self, inv: &ProcessInvocation, out: ProcessOutput) -> Result<Version, TaskFailure> {
        let stdout = require_success(inv, out)?;
        Version::parse_banner(&stdout).map_err(|e| TaskFailure::Parse(e.to_string()))
    }
}

/// `git config --get <key>` or `git symbolic-ref -q`: exit 1 without a
/// message is `None`, not a failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptionalValueInterpreter;

impl OutputInterpreter<Option<String>> for OptionalValueInterpreter {
    fn interpret(
        &self,
        inv: &ProcessInvocation,
        out: ProcessOutput,
    ) -> Result<Option<String>, TaskFailure> {
        // exit 1 means the key is not set or HEAD is not symbolic
        if !out.success && out.code == Some(1) && out.stderr.trim().is_empty() {
            return Ok(None);
        }
        let value = require_success(inv, out)?;
        let value = value.trim_end_matches(['\r', '\n']);
        Ok((!value.is_empty()).then(|| value.to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigListInterpreter;

impl OutputInterpreter<RepositoryConfig> for ConfigListInterpreter {
    fn interpret(
        &self,
        inv: &ProcessInvocation,
        out: ProcessOutput,
    ) -> Result<RepositoryConfig, TaskFailure> {
        require_success(inv, out).map(|s| RepositoryConfig::parse_list(&s))
    }
}

/// One ref name per line, as printed by `for-each-ref --format=%(refname:short)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RefNamesInterpreter;

impl OutputInterpreter<Vec<String>> for RefNamesInterpreter {
    fn interpret(&self, inv: &ProcessInvocation, out: ProcessOutput) -> Result<Vec<String>, TaskFailure> {
        let stdout = require_success(inv, out)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Group `origin/main` style ref names into a remote branch index.
///
/// Symbolic `origin/HEAD` entries (printed as just `origin`) are skipped.
pub fn remote_branch_index(names: &[String]) -> RemoteBranchIndex {
    let mut index = RemoteBranchIndex::new();
    for name in names {
        let Some((remote, branch)) = name.split_once('/') else {
            continue;
        };
        if branch == "HEAD" {
            continue;
        }
        index.entry(remote.to_string()).or_default().insert(
            branch.to_string(),
            ConfigBranch::tracking(branch, remote, format!("refs/heads/{}", branch)),
        );
    }
    index
}

/// Full ref names listed in a `.git/packed-refs` file.
///
/// Comment lines and peeled `^<sha>` lines are skipped.
pub fn packed_ref_names(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
        .filter_map(|line| line.split_once(' '))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
