//! Release metadata: the endpoint's JSON document and the package derived from it.

use super::verification::Sha256Digest;
use crate::constants::RELEASE_NOTES_MAX_LENGTH;
use crate::core::CheckError;
use crate::version::AppVersion;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// "Latest release" document as returned by the release endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseInfo {
    /// Version tag, e.g. `v2.0.0`.
    pub tag_name: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Free-text release notes.
    #[serde(default)]
    pub body: Option<String>,
    /// Downloadable files.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// One downloadable file of a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
}

/// Everything needed to download and install one release.
///
/// Immutable once produced by a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePackage {
    /// Release version.
    pub version: AppVersion,
    /// Asset URL.
    pub download_url: String,
    /// Asset file name.
    pub asset_name: String,
    /// Advertised size, when published.
    pub size: Option<u64>,
    /// Digest found in the release notes.
    pub checksum: Option<Sha256Digest>,
    /// Release notes, truncated for display.
    pub notes: String,
}

/// Selects the installable asset of a release.
#[derive(Debug, Clone)]
pub struct AssetMatcher {
    pattern: Regex,
}

impl AssetMatcher {
    /// Matcher for a user-supplied pattern.
    pub fn new(pattern: &str) -> Result<Self, CheckError> {
        Regex::new(pattern)
            .map(|pattern| Self { pattern })
            .map_err(|e| CheckError::Config(format!("invalid asset pattern: {e}")))
    }

    /// Matcher for the running platform.
    pub fn platform_default() -> Result<Self, CheckError> {
        let pattern = if cfg!(windows) {
            r"(?i)\.exe$"
        } else if cfg!(target_os = "macos") {
            r"(?i)(macos|darwin|osx)"
        } else {
            r"(?i)linux"
        };
        Self::new(pattern)
    }

    /// Matcher from an optional configured pattern.
    pub fn from_setting(pattern: Option<&str>) -> Result<Self, CheckError> {
        match pattern.filter(|p| !p.trim().is_empty()) {
            Some(pattern) => Self::new(pattern),
            None => Self::platform_default(),
        }
    }

    /// Whether `name` is an installable package.
    pub fn matches(&self, name: &str) -> bool {
        !is_checksum_asset(name) && self.pattern.is_match(name)
    }
}

fn is_checksum_asset(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".sha256", ".sha256sum", ".sig", ".asc", "checksums.txt", "sha256sums"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
}

static CHECKSUM_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)sha-?256[^0-9a-f]{0,10}([0-9a-f]{64})").ok());

/// First SHA-256 digest written in the notes, e.g. `SHA256: 3a7b...`.
pub fn extract_checksum(notes: &str) -> Option<Sha256Digest> {
    CHECKSUM_PATTERN
        .as_ref()?
        .captures(notes)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Bound notes to `max` characters, appending `...` when cut.
pub fn truncate_notes(notes: &str, max: usize) -> String {
    let trimmed = notes.trim();
    match trimmed.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

impl ReleaseInfo {
    /// Parsed release version.
    pub fn version(&self) -> Result<AppVersion, CheckError> {
        Ok(AppVersion::from_tag(&self.tag_name)?)
    }

    /// Build the package for this platform.
    pub fn into_package(self, matcher: &AssetMatcher) -> Result<UpdatePackage, CheckError> {
        let version = self.version()?;
        let notes = self.body.unwrap_or_default();

        let asset = self
            .assets
            .into_iter()
            .find(|asset| matcher.matches(&asset.name))
            .ok_or(CheckError::NoAsset {
                tag: self.tag_name,
            })?;

        Ok(UpdatePackage {
            version,
            download_url: asset.browser_download_url,
            asset_name: asset.name,
            size: asset.size,
            checksum: extract_checksum(&notes),
            notes: truncate_notes(&notes, RELEASE_NOTES_MAX_LENGTH),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";

    fn release(body: &str, assets: &[&str]) -> ReleaseInfo {
        ReleaseInfo {
            tag_name: "v2.0.0".into(),
            name: None,
            body: Some(body.into()),
            assets: assets
                .iter()
                .map(|name| ReleaseAsset {
                    name: (*name).into(),
                    browser_download_url: format!("https://example.invalid/{name}"),
                    size: Some(10),
                })
                .collect(),
        }
    }

    #[test]
    fn test_checksum_formats() {
        assert_eq!(
            extract_checksum(&format!("SHA256: {DIGEST}")).unwrap().to_string(),
            DIGEST
        );
        assert!(extract_checksum(&format!("sha-256 = `{}`", DIGEST.to_uppercase())).is_some());
        assert!(extract_checksum(&format!("**SHA256 checksum**: {DIGEST}")).is_none());
        assert!(extract_checksum("no digest here").is_none());
    }

    #[test]
    fn test_truncate_notes() {
        assert_eq!(truncate_notes("short", 10), "short");
        assert_eq!(truncate_notes("abcdefghij", 10), "abcdefghij");
        assert_eq!(truncate_notes("abcdefghijk", 10), "abcdefghij...");
        // Multi-byte characters are never split.
        assert_eq!(truncate_notes("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_into_package_picks_first_match_and_skips_checksums() {
        let matcher = AssetMatcher::new(r"(?i)linux").unwrap();
        let release = release(
            &format!("Fixes.\n\nSHA256: {DIGEST}"),
            &["lifeline-linux.sha256", "lifeline-windows.exe", "lifeline-linux", "lifeline-linux-arm"],
        );

        let package = release.into_package(&matcher).unwrap();
        assert_eq!(package.version, "2.0.0".parse().unwrap());
        assert_eq!(package.asset_name, "lifeline-linux");
        assert_eq!(package.download_url, "https://example.invalid/lifeline-linux");
        assert_eq!(package.checksum.unwrap().to_string(), DIGEST);
    }

    #[test]
    fn test_missing_asset() {
        let matcher = AssetMatcher::new(r"\.exe$").unwrap();
        let err = release("", &["lifeline-linux"]).into_package(&matcher).unwrap_err();
        assert!(matches!(err, CheckError::NoAsset { .. }));
    }

    #[test]
    fn test_absent_checksum_is_valid() {
        let matcher = AssetMatcher::new(".").unwrap();
        let package = release("No digest.", &["lifeline"]).into_package(&matcher).unwrap();
        assert!(package.checksum.is_none());
    }

    #[test]
    fn test_long_notes_are_bounded() {
        let matcher = AssetMatcher::new(".").unwrap();
        let notes = "x".repeat(RELEASE_NOTES_MAX_LENGTH * 2);
        let package = release(&notes, &["lifeline"]).into_package(&matcher).unwrap();
        assert_eq!(package.notes.chars().count(), RELEASE_NOTES_MAX_LENGTH + 3);
    }
}
