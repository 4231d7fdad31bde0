//! Application version values and their total order.
//!
//! Release tags published for the application use a dotted numeric form with an
//! optional fourth "build" component (`1.9.7` or `1.9.7.2`) and an optional
//! leading prefix (`v1.9.7`, `release-1.9.7`). [`AppVersion`] parses all of them
//! and orders them totally: missing components count as zero, so `1.2` and
//! `1.2.0.0` are equal.
//!
//! The three-part core is delegated to [`semver::Version`], which gives
//! pre-release handling (`2.0.0-beta.1 < 2.0.0`) for free. The optional build
//! component is compared after the core.
//!
//! # Examples
//!
//! ```rust
//! use lifeline::version::AppVersion;
//!
//! let installed: AppVersion = "1.9.7".parse().unwrap();
//! let remote = AppVersion::from_tag("v1.9.7.1").unwrap();
//! assert!(remote > installed);
//! assert_eq!(AppVersion::from_tag("1.9").unwrap(), "1.9.0.0".parse().unwrap());
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a string cannot be parsed as an [`AppVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{input}': {reason}")]
pub struct VersionParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl VersionParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// An ordered application version: `major.minor.patch[.build]`.
#[derive(Debug, Clone)]
pub struct AppVersion {
    core: semver::Version,
    build: Option<u64>,
}

impl AppVersion {
    /// Build a version from numeric components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            core: semver::Version::new(major, minor, patch),
            build: None,
        }
    }

    /// Attach a fourth build component.
    #[must_use]
    pub fn with_build(mut self, build: u64) -> Self {
        self.build = Some(build);
        self
    }

    /// The version this binary was compiled as.
    pub fn current() -> Self {
        // CARGO_PKG_VERSION is always valid semver.
        Self {
            core: semver::Version::parse(env!("CARGO_PKG_VERSION"))
                .unwrap_or_else(|_| semver::Version::new(0, 0, 0)),
            build: None,
        }
    }

    /// Parse a release tag, stripping any leading non-numeric prefix.
    ///
    /// `v2.0.0`, `release-2.0.0` and `2.0.0` all yield `2.0.0`.
    pub fn from_tag(tag: &str) -> Result<Self, VersionParseError> {
        let trimmed = tag.trim();
        let start = trimmed
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| VersionParseError::new(tag, "no numeric component"))?;
        trimmed[start..].parse()
    }

    /// Major component.
    pub fn major(&self) -> u64 {
        self.core.major
    }

    /// Minor component.
    pub fn minor(&self) -> u64 {
        self.core.minor
    }

    /// Patch component.
    pub fn patch(&self) -> u64 {
        self.core.patch
    }

    /// Fourth build component, zero when absent.
    pub fn build(&self) -> u64 {
        self.build.unwrap_or(0)
    }
}

impl FromStr for AppVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(VersionParseError::new(s, "empty"));
        }

        // Split off a semver pre-release before counting numeric components.
        let (numeric, pre) = match input.split_once('-') {
            Some((numeric, pre)) => (numeric, Some(pre)),
            None => (input, None),
        };

        let parts: Vec<&str> = numeric.split('.').collect();
        if parts.len() > 4 {
            return Err(VersionParseError::new(s, "more than four components"));
        }

        let mut numbers = [0u64; 4];
        for (i, part) in parts.iter().enumerate() {
            numbers[i] = part
                .parse()
                .map_err(|_| VersionParseError::new(s, format!("'{part}' is not a number")))?;
        }

        let mut core = semver::Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(pre) = pre {
            core.pre = semver::Prerelease::new(pre)
                .map_err(|e| VersionParseError::new(s, e.to_string()))?;
        }

        Ok(Self {
            core,
            build: (parts.len() == 4).then_some(numbers[3]),
        })
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.core.major, self.core.minor, self.core.patch)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
        }
        if !self.core.pre.is_empty() {
            write!(f, "-{}", self.core.pre)?;
        }
        Ok(())
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.core
            .cmp_precedence(&other.core)
            .then_with(|| self.build().cmp(&other.build()))
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AppVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AppVersion {}

impl Hash for AppVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.major.hash(state);
        self.core.minor.hash(state);
        self.core.patch.hash(state);
        self.core.pre.hash(state);
        self.build().hash(state);
    }
}

impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AppVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> AppVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_three_and_four_components() {
        let three = v("1.9.7");
        assert_eq!((three.major(), three.minor(), three.patch(), three.build()), (1, 9, 7, 0));

        let four = v("1.9.7.3");
        assert_eq!(four.build(), 3);
        assert_eq!(four.to_string(), "1.9.7.3");
        assert_eq!(four, AppVersion::new(1, 9, 7).with_build(3));
    }

    #[test]
    fn test_missing_components_are_zero() {
        assert_eq!(v("2"), v("2.0.0"));
        assert_eq!(v("1.2"), v("1.2.0.0"));
        assert_eq!(v("1.2.0"), v("1.2.0.0"));
    }

    #[test]
    fn test_total_order() {
        assert!(v("1.0.1") > v("1.0.0"));
        assert!(v("1.0.0.1") > v("1.0.0"));
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0.0-beta.1") < v("2.0.0"));
        assert_eq!(v("1.0.0").cmp(&v("1.0.0")), Ordering::Equal);
    }

    #[test]
    fn test_from_tag_strips_prefix() {
        assert_eq!(AppVersion::from_tag("v2.0.0").unwrap(), v("2.0.0"));
        assert_eq!(AppVersion::from_tag("release-1.4").unwrap(), v("1.4.0"));
        assert_eq!(AppVersion::from_tag(" V3.1.0.2 ").unwrap(), v("3.1.0.2"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(AppVersion::from_tag("latest").is_err());
        assert!("".parse::<AppVersion>().is_err());
        assert!("1.2.3.4.5".parse::<AppVersion>().is_err());
        assert!("1.x.3".parse::<AppVersion>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("1.2.3.4")).unwrap();
        assert_eq!(json, "\"1.2.3.4\"");
        let back: AppVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.2.3.4"));
    }

    #[test]
    fn test_current_matches_package_version() {
        assert_eq!(AppVersion::current().to_string(), env!("CARGO_PKG_VERSION"));
    }
}
