//! Status markers: the cross-generation hand-off between the install routine
//! and the next application startup.
//!
//! Each marker kind is one fixed-name text file in a shared location (the system
//! temporary directory unless `LIFELINE_MARKER_DIR` is set). Presence is the
//! protocol; the payload is a short text:
//!
//! | File | Payload |
//! |---|---|
//! | `lifeline_update_success.txt` | installed version |
//! | `lifeline_update_error.txt` | error code on the first line, message after it |
//! | `lifeline_update_expected.txt` | version the parent handed off |
//! | `lifeline_update_pending.txt` | path of the package awaiting a reboot |
//!
//! The writer may be killed at any point, so every write is write-then-rename.
//! Readers treat anything they cannot parse as absent.

use crate::constants::MARKER_DIR_ENV;
use crate::utils::fs::atomic_write;
use crate::version::AppVersion;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from writing a marker.
#[derive(Debug, Error)]
#[error("failed to write {kind} marker at {}", path.display())]
pub struct MarkerError {
    /// Marker kind.
    pub kind: MarkerKind,
    /// File path.
    pub path: PathBuf,
    /// Underlying error.
    #[source]
    pub source: anyhow::Error,
}

/// The four marker kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// `{success: version}`
    Success,
    /// `{error: message, code}`
    Error,
    /// `{expectedVersion: version}`
    Expected,
    /// `{pendingInstallerPath: path}`
    Pending,
}

impl MarkerKind {
    /// Every kind, in reconciliation order.
    pub const ALL: [Self; 4] = [Self::Success, Self::Error, Self::Expected, Self::Pending];

    /// Fixed file name.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Success => "lifeline_update_success.txt",
            Self::Error => "lifeline_update_error.txt",
            Self::Expected => "lifeline_update_expected.txt",
            Self::Pending => "lifeline_update_pending.txt",
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Expected => "expected-version",
            Self::Pending => "pending-install",
        })
    }
}

/// Payload of the error marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMarker {
    /// Stable snake_case code, e.g. `copy_failed`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorMarker {
    /// Create a marker payload.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    fn encode(&self) -> String {
        format!("{}\n{}", self.code.trim(), self.message)
    }

    fn decode(raw: &str) -> Option<Self> {
        let (code, message) = raw.split_once('\n').unwrap_or((raw, ""));
        let code = code.trim();
        if code.is_empty() || code.contains(char::is_whitespace) {
            return None;
        }
        Some(Self::new(code, message.trim()))
    }
}

/// Every marker found in one read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerSet {
    /// Installed version.
    pub success: Option<AppVersion>,
    /// Failure report.
    pub error: Option<ErrorMarker>,
    /// Version the parent expected to be installed.
    pub expected: Option<AppVersion>,
    /// Package waiting for a reboot-deferred replacement.
    pub pending: Option<PathBuf>,
}

impl MarkerSet {
    /// No marker present.
    pub fn is_empty(&self) -> bool {
        self.success.is_none()
            && self.error.is_none()
            && self.expected.is_none()
            && self.pending.is_none()
    }
}

/// The marker directory and its files.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: PathBuf,
}

impl MarkerStore {
    /// Store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `LIFELINE_MARKER_DIR`, or the system temporary directory.
    pub fn default_location() -> Self {
        let dir = std::env::var_os(MARKER_DIR_ENV)
            .filter(|d| !d.is_empty())
            .map_or_else(std::env::temp_dir, PathBuf::from);
        Self::new(dir)
    }

    /// Marker directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of one marker file.
    pub fn path(&self, kind: MarkerKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Record a successful install of `version`.
    pub fn write_success(&self, version: &AppVersion) -> Result<(), MarkerError> {
        self.write(MarkerKind::Success, &version.to_string())
    }

    /// Record a failed install.
    pub fn write_error(&self, marker: &ErrorMarker) -> Result<(), MarkerError> {
        self.write(MarkerKind::Error, &marker.encode())
    }

    /// Record the version the parent is handing off.
    pub fn write_expected(&self, version: &AppVersion) -> Result<(), MarkerError> {
        self.write(MarkerKind::Expected, &version.to_string())
    }

    /// Record a package awaiting reboot-deferred replacement.
    pub fn write_pending(&self, package: &Path) -> Result<(), MarkerError> {
        self.write(MarkerKind::Pending, &package.to_string_lossy())
    }

    /// Read every marker without deleting anything.
    pub fn peek(&self) -> MarkerSet {
        self.collect(false)
    }

    /// Read and delete every marker. Each marker is observed by exactly one call.
    pub fn take(&self) -> MarkerSet {
        self.collect(true)
    }

    /// Delete one marker if present.
    pub fn clear(&self, kind: MarkerKind) {
        remove_marker(&self.path(kind));
    }

    fn write(&self, kind: MarkerKind, payload: &str) -> Result<(), MarkerError> {
        let path = self.path(kind);
        debug!(marker = %kind, path = %path.display(), "Writing status marker");
        atomic_write(&path, payload.as_bytes()).map_err(|source| MarkerError {
            kind,
            path,
            source,
        })
    }

    fn collect(&self, consume: bool) -> MarkerSet {
        let mut set = MarkerSet::default();
        for kind in MarkerKind::ALL {
            let path = self.path(kind);
            let Some(raw) = read_marker(&path) else {
                continue;
            };
            if consume {
                remove_marker(&path);
            }

            let parsed = match kind {
                MarkerKind::Success => parse_version(&raw).map(|v| set.success = Some(v)),
                MarkerKind::Expected => parse_version(&raw).map(|v| set.expected = Some(v)),
                MarkerKind::Error => ErrorMarker::decode(&raw).map(|e| set.error = Some(e)),
                MarkerKind::Pending => {
                    let trimmed = raw.trim();
                    (!trimmed.is_empty()).then(|| set.pending = Some(PathBuf::from(trimmed)))
                }
            };
            if parsed.is_none() {
                warn!(marker = %kind, path = %path.display(), "Ignoring malformed status marker");
            }
        }
        set
    }
}

fn read_marker(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read status marker");
            None
        }
    }
}

fn remove_marker(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Consumed status marker"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Cannot delete status marker"),
    }
}

fn parse_version(raw: &str) -> Option<AppVersion> {
    raw.trim().parse().ok()
}
