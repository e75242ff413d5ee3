//! Client settings (.gitchain.toml)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::git::Version;

/// Settings file looked up in the working directory.
pub const SETTINGS_FILE_NAME: &str = ".gitchain.toml";
/// Overrides `git_install_path` when set.
pub const GIT_PATH_ENV: &str = "GITCHAIN_GIT_PATH";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {message}")]
    ReadError { path: String, message: String },
    #[error("Failed to parse settings {path}: {message}")]
    ParseError { path: String, message: String },
}

/// Client settings from .gitchain.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Explicit git executable; skips discovery when set
    #[serde(default)]
    pub git_install_path: Option<PathBuf>,
    /// Directory of a bundled git distribution checked before PATH
    #[serde(default)]
    pub bundled_git_dir: Option<PathBuf>,
    #[serde(default = "default_minimum_git_version")]
    pub minimum_git_version: Version,
    #[serde(default = "default_minimum_lfs_version")]
    pub minimum_lfs_version: Version,
    /// Maximum paths passed to a single `git add`/`checkout`/`rm`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_remote")]
    pub default_remote: String,
    #[serde(default = "default_log_limit")]
    pub log_limit: usize,
}

fn default_minimum_git_version() -> Version {
    Version::new(2, 11, 0)
}

fn default_minimum_lfs_version() -> Version {
    Version::new(2, 4, 0)
}

fn default_batch_size() -> usize {
    5000
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_log_limit() -> usize {
    100
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            git_install_path: None,
            bundled_git_dir: None,
            minimum_git_version: default_minimum_git_version(),
            minimum_lfs_version: default_minimum_lfs_version(),
            batch_size: default_batch_size(),
            default_remote: default_remote(),
            log_limit: default_log_limit(),
        }
    }
}

impl ClientSettings {
    /// Load settings for a working directory.
    ///
    /// Looks for `.gitchain.toml` in `working_dir`, then
    /// `~/.gitchain/config.toml`, and falls back to defaults. The
    /// `GITCHAIN_GIT_PATH` environment variable overrides the install path.
    pub fn load(working_dir: &Path) -> Result<Self, SettingsError> {
        let candidates = [
            Some(working_dir.join(SETTINGS_FILE_NAME)),
            Self::global_path(),
        ];
        let mut settings = match candidates.into_iter().flatten().find(|p| p.is_file()) {
            Some(path) => Self::load_file(&path)?,
            None => Self::default(),
        };
        if let Some(path) = std::env::var_os(GIT_PATH_ENV).filter(|v| !v.is_empty()) {
            settings.git_install_path = Some(PathBuf::from(path));
        }
        Ok(settings)
    }

    pub fn load_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn global_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".gitchain").join("config.toml"))
    }

    pub fn with_git_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.git_install_path = Some(path.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ClientSettings::default();
        assert_eq!(settings.minimum_git_version, Version::new(2, 11, 0));
        assert_eq!(settings.batch_size, 5000);
        assert_eq!(settings.default_remote, "origin");
        assert!(settings.git_install_path.is_none());
    }

    #[test]
    fn test_parse_settings() {
        let toml_str = r#"
git_install_path = "/opt/git/bin/git"
minimum_git_version = "2.20.1"
batch_size = 100
"#;
        let settings: ClientSettings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.git_install_path, Some(PathBuf::from("/opt/git/bin/git")));
        assert_eq!(settings.minimum_git_version, Version::new(2, 20, 1));
        assert_eq!(settings.minimum_lfs_version, Version::new(2, 4, 0));
        assert_eq!(settings.batch_size, 100);
    }

    #[test]
    fn test_bad_version_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "minimum_git_version = \"two\"\n").unwrap();
        assert!(matches!(
            ClientSettings::load_file(&path),
            Err(SettingsError::ParseError { .. })
        ));
    }

    #[test]
    fn test_load_prefers_working_dir_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE_NAME), "default_remote = \"upstream\"\n").unwrap();
        let settings = ClientSettings::load(dir.path()).unwrap();
        assert_eq!(settings.default_remote, "upstream");
    }
}
