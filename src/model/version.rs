//! Backend API versions.
//!
//! Docker reports API versions with two components (`1.41`) while some
//! backends use three (`2.6.0`). Both are parsed into a [`semver::Version`]
//! by padding the missing components with zeros.

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A backend API version.
#[derive(Debug, Clone)]
pub struct ApiVersion {
    /// Padded semantic version used for ordering.
    version: Version,
    /// Number of components in the original spelling (1 to 3).
    components: u8,
}

impl ApiVersion {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            version: Version::new(major, minor, patch),
            components: 3,
        }
    }

    /// Creates a two-component version, the way Docker spells API versions.
    #[must_use]
    pub const fn docker(major: u64, minor: u64) -> Self {
        Self {
            version: Version::new(major, minor, 0),
            components: 2,
        }
    }

    /// Parses a version such as `1.41`, `v1.41` or `2.6.0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not one to three dot-separated numbers.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidVersion {
            version: input.to_string(),
        };

        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }
        if parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(invalid());
        }

        let mut padded: Vec<&str> = parts.clone();
        while padded.len() < 3 {
            padded.push("0");
        }

        let version = Version::parse(&padded.join(".")).map_err(|_| invalid())?;
        let components = u8::try_from(parts.len()).map_err(|_| invalid())?;

        Ok(Self { version, components })
    }

    /// Returns true if this version is at least `minimum`.
    #[must_use]
    pub fn satisfies(&self, minimum: &Self) -> bool {
        self >= minimum
    }
}

impl PartialEq for ApiVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for ApiVersion {}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.components {
            1 => write!(f, "{}", self.version.major),
            2 => write!(f, "{}.{}", self.version.major, self.version.minor),
            _ => write!(f, "{}", self.version),
        }
    }
}

impl FromStr for ApiVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ApiVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
