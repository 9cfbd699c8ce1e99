//! Semantic versions reported by Kea daemons.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A `MAJOR.MINOR.PATCH` version. Ordering is lexicographic over
/// (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Returned when a version string does not start with three dot separated
/// integers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid semantic version: {0:?}")]
pub struct InvalidVersion(pub String);

impl SemanticVersion {
    /// The greatest representable version.
    pub const LATEST: Self = Self::new(u32::MAX, u32::MAX, u32::MAX);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `version`, falling back to [`SemanticVersion::LATEST`] when it
    /// cannot be parsed. Version-gated workarounds then treat the daemon as
    /// the newest release.
    pub fn parse_or_latest(version: &str) -> Self {
        version.parse().unwrap_or(Self::LATEST)
    }
}

impl FromStr for SemanticVersion {
    type Err = InvalidVersion;

    /// Accepts text after the patch number (`2.6.0-beta`, `2.4.1 (isc)`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersion(s.to_owned());
        let mut parts = s.trim_start().splitn(3, '.');
        let major = parts.next().ok_or_else(invalid)?;
        let minor = parts.next().ok_or_else(invalid)?;
        let rest = parts.next().ok_or_else(invalid)?;
        let patch_len = rest.bytes().take_while(u8::is_ascii_digit).count();

        let number = |text: &str| text.parse::<u32>().map_err(|_| invalid());
        Ok(Self {
            major: number(major)?,
            minor: number(minor)?,
            patch: number(&rest[..patch_len])?,
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
