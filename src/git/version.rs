//! Dotted numeric versions, as printed by `git --version` and `git lfs version`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("no version number in '{0}'")]
    Missing(String),
    #[error("version '{0}' must have 3 or 4 numeric parts")]
    Malformed(String),
}

/// A 3- or 4-part version. A missing fourth part compares as zero.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    parts: [u32; 4],
    len: usize,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            parts: [major, minor, patch, 0],
            len: 3,
        }
    }

    pub const fn with_build(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            parts: [major, minor, patch, build],
            len: 4,
        }
    }

    pub fn major(&self) -> u32 {
        self.parts[0]
    }

    pub fn minor(&self) -> u32 {
        self.parts[1]
    }

    pub fn patch(&self) -> u32 {
        self.parts[2]
    }

    pub fn build(&self) -> Option<u32> {
        (self.len == 4).then_some(self.parts[3])
    }

    /// Pull the first dotted number out of a version banner.
    ///
    /// `git version 2.39.2.windows.1` gives 2.39.2, `git-lfs/3.4.0 (GitHub; linux amd64)`
    /// gives 3.4.0.
    pub fn parse_banner(banner: &str) -> Result<Self, VersionError> {
        let start = banner
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| VersionError::Missing(banner.trim().to_string()))?;
        let mut parts = Vec::new();
        for piece in banner[start..].split('.') {
            let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            let complete = digits.len() == piece.len();
            parts.push(digits);
            if !complete || parts.len() == 4 {
                break;
            }
        }
        if parts.len() < 3 {
            return Err(VersionError::Malformed(banner.trim().to_string()));
        }
        parts.join(".").parse()
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pieces: Vec<&str> = s.trim().split('.').collect();
        if pieces.len() < 3 || pieces.len() > 4 {
            return Err(VersionError::Malformed(s.to_string()));
        }
        let mut parts = [0u32; 4];
        for (slot, piece) in parts.iter_mut().zip(&pieces) {
            *slot = piece
                .parse()
                .map_err(|_| VersionError::Malformed(s.to_string()))?;
        }
        Ok(Self {
            parts,
            len: pieces.len(),
        })
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self.parts[..self.len].iter().map(|p| p.to_string()).collect();
        f.write_str(&text.join("."))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_banners() {
        assert_eq!(
            Version::parse_banner("git version 2.39.2.windows.1\n").unwrap(),
            Version::new(2, 39, 2)
        );
        assert_eq!(
            Version::parse_banner("git-lfs/3.4.0 (GitHub; linux amd64; go 1.21.1)").unwrap(),
            Version::new(3, 4, 0)
        );
        assert_eq!(
            Version::parse_banner("git version 2.11.0.1").unwrap(),
            Version::with_build(2, 11, 0, 1)
        );
        assert!(Version::parse_banner("git version").is_err());
        assert!(Version::parse_banner("git version 2.11").is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(Version::new(2, 11, 0) < Version::new(2, 11, 1));
        assert!(Version::new(2, 9, 9) < Version::new(2, 10, 0));
        assert!(Version::with_build(2, 11, 0, 1) > Version::new(2, 11, 0));
        assert_eq!(Version::with_build(2, 11, 0, 0), Version::new(2, 11, 0));
    }

    #[test]
    fn test_display_round_trips_part_count() {
        assert_eq!(Version::new(1, 2, 3).to_string(), "1.2.3");
        assert_eq!("1.2.3.4".parse::<Version>().unwrap().to_string(), "1.2.3.4");
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.3.4.5".parse::<Version>().is_err());
    }
}
