//! Branch and remote sections of a repository's git config.

use std::collections::BTreeMap;

use serde::Serialize;

/// A local branch, optionally tracking a remote branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConfigBranch {
    pub name: String,
    /// Remote name from `branch.<name>.remote`
    pub remote: Option<String>,
    /// Upstream ref from `branch.<name>.merge`, e.g. `refs/heads/main`
    pub merge: Option<String>,
}

impl ConfigBranch {
    /// A branch record with no tracking information.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: None,
            merge: None,
        }
    }

    pub fn tracking(
        name: impl Into<String>,
        remote: impl Into<String>,
        merge: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            remote: Some(remote.into()),
            merge: Some(merge.into()),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.remote.is_some()
    }

    /// `origin/main` style name of the upstream branch.
    pub fn upstream(&self) -> Option<String> {
        let remote = self.remote.as_ref()?;
        let merge = self.merge.as_ref()?;
        let branch = merge.strip_prefix("refs/heads/").unwrap_or(merge);
        Some(format!("{}/{}", remote, branch))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConfigRemote {
    pub name: String,
    pub url: String,
}

impl ConfigRemote {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Snapshot of `git config --list` restricted to branches and remotes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryConfig {
    branches: BTreeMap<String, ConfigBranch>,
    /// In order of first appearance in the listing
    remotes: Vec<ConfigRemote>,
}

impl RepositoryConfig {
    pub fn new(
        branches: impl IntoIterator<Item = ConfigBranch>,
        remotes: impl IntoIterator<Item = ConfigRemote>,
    ) -> Self {
        Self {
            branches: branches.into_iter().map(|b| (b.name.clone(), b)).collect(),
            remotes: remotes.into_iter().collect(),
        }
    }

    /// Parse `key=value` lines as printed by `git config --list`.
    ///
    /// Later values override earlier ones, matching git's own precedence
    /// (system, global, then local).
    pub fn parse_list(output: &str) -> Self {
        let mut config = Self::default();
        for line in output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Some((section, rest)) = key.split_once('.') else {
                continue;
            };
            let Some((subsection, variable)) = rest.rsplit_once('.') else {
                continue;
            };
            match (section, variable) {
                ("branch", "remote") => {
                    config.branch_mut(subsection).remote = Some(value.to_string());
                }
                ("branch", "merge") => {
                    config.branch_mut(subsection).merge = Some(value.to_string());
                }
                ("remote", "url") => match config.remotes.iter_mut().find(|r| r.name == subsection) {
                    Some(remote) => remote.url = value.to_string(),
                    None => config.remotes.push(ConfigRemote::new(subsection, value)),
                },
                _ => {}
            }
        }
        config
    }

    fn branch_mut(&mut self, name: &str) -> &mut ConfigBranch {
        self.branches
            .entry(name.to_string())
            .or_insert_with(|| ConfigBranch::bare(name))
    }

    pub fn get_branch(&self, name: &str) -> Option<&ConfigBranch> {
        self.branches.get(name)
    }

    pub fn get_remote(&self, name: &str) -> Option<&ConfigRemote> {
        self.remotes.iter().find(|r| r.name == name)
    }

    pub fn get_remotes(&self) -> &[ConfigRemote] {
        &self.remotes
    }

    pub fn branches(&self) -> impl Iterator<Item = &ConfigBranch> {
        self.branches.values()
    }
}
