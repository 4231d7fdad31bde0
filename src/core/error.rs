//! Error handling for lifeline
//!
//! Each component owns one strongly-typed error enum, and the glue code
//! (`app`, `cli`) carries them through [`anyhow`] with context. The enums follow
//! the failure taxonomy of the update pipeline:
//!
//! - [`GuardError`] - single-instance coordination. `AlreadyRunning` is expected
//!   behaviour when the user double-launches, not a fault.
//! - [`CheckError`] - release query failures, split into transient (retried) and
//!   terminal (surfaced) by [`CheckError::is_transient`].
//! - [`FetchError`] - download failures: timeout, cancellation, checksum
//!   mismatch, I/O.
//! - [`InstallError`] - failures of the external install routine. Every variant
//!   is paired with a rollback that leaves a launchable executable in place;
//!   [`InstallError::code`] is the stable string written into the error marker.
//! - [`RegistrationError`] - autostart registry failures; degraded, never fatal.
//!
//! [`user_friendly_error`] converts any `anyhow::Error` into an [`ErrorContext`]
//! with a suggestion for the terminal.

use crate::version::VersionParseError;
use colored::Colorize;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from acquiring the single-instance lock.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Another instance holds the lock. Callers show a notice and exit with 0.
    #[error("another instance is already running (lock port {port} is held)")]
    AlreadyRunning {
        /// The contested loopback port.
        port: u16,
    },

    /// The lock endpoint could not be bound for a reason other than contention.
    #[error("failed to bind single-instance lock on {addr}")]
    Bind {
        /// Address that was attempted.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
}

/// Errors from querying the release endpoint.
#[derive(Debug, Error)]
pub enum CheckError {
    /// HTTP 429, or 403 with an exhausted rate-limit budget.
    #[error("release endpoint rate-limited the request (HTTP {status})")]
    RateLimited {
        /// Response status code.
        status: u16,
    },

    /// HTTP 5xx from the release endpoint.
    #[error("release endpoint returned server error (HTTP {status})")]
    Server {
        /// Response status code.
        status: u16,
    },

    /// HTTP 404: no published release. Terminal, never retried.
    #[error("no release published at {url}")]
    NotFound {
        /// The queried endpoint.
        url: String,
    },

    /// Any other non-success status.
    #[error("release endpoint returned unexpected HTTP {status}")]
    UnexpectedStatus {
        /// Response status code.
        status: u16,
    },

    /// The request exceeded its timeout.
    #[error("release query timed out")]
    Timeout,

    /// Connection, TLS or body transfer failure.
    #[error("network error while querying releases")]
    Network(#[source] reqwest::Error),

    /// The response body was not the expected release document.
    #[error("malformed release metadata: {0}")]
    Parse(String),

    /// The release tag is not a parseable version.
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),

    /// A newer release exists but publishes no package for this platform.
    #[error("release {tag} has no installable package for this platform")]
    NoAsset {
        /// Release tag.
        tag: String,
    },

    /// The release endpoint or asset pattern is invalid.
    #[error("invalid update source configuration: {0}")]
    Config(String),
}

impl CheckError {
    /// Whether the failure is worth retrying (rate limiting and 5xx only).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Server { .. })
    }

    /// Category recorded in the update statistics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limit",
            Self::Server { .. } => "server",
            Self::NotFound { .. } => "not_found",
            Self::Timeout => "timeout",
            Self::Network(_) => "network",
            Self::Parse(_) | Self::InvalidVersion(_) => "parse",
            Self::UnexpectedStatus { .. } | Self::NoAsset { .. } | Self::Config(_) => "other",
        }
    }

    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Parse(error.to_string())
        } else {
            Self::Network(error)
        }
    }
}

/// Errors from downloading and verifying an update package.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The whole download exceeded its hard deadline.
    #[error("download did not complete within {}s", after.as_secs())]
    Timeout {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The cancellation token fired between chunks.
    #[error("download cancelled")]
    Cancelled,

    /// The completed file does not hash to the published digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Published digest (hex).
        expected: String,
        /// Digest of the downloaded bytes (hex).
        actual: String,
    },

    /// The release carries no checksum and the policy requires one.
    #[error("release does not publish a checksum and verification is required")]
    ChecksumMissing,

    /// The asset URL answered with a non-success status.
    #[error("download failed with HTTP {status}")]
    Http {
        /// Response status code.
        status: u16,
    },

    /// Connection or transfer failure.
    #[error("network error while downloading")]
    Network(#[source] reqwest::Error),

    /// Local filesystem failure.
    #[error("I/O error while downloading")]
    Io(#[from] io::Error),
}

/// Errors of the external install routine and its hand-off.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The parent process did not exit in time.
    #[error("application (pid {pid}) did not exit within {}s", waited.as_secs())]
    LockTimeout {
        /// Parent process id.
        pid: u32,
        /// How long the routine waited.
        waited: Duration,
    },

    /// The current executable could not be copied to its `.bak` sibling.
    #[error("failed to back up {} after {attempts} attempts", path.display())]
    BackupFailed {
        /// Executable being backed up.
        path: PathBuf,
        /// Attempts made.
        attempts: u32,
        /// Last error.
        #[source]
        source: io::Error,
    },

    /// The downloaded package could not be copied over the install path.
    #[error("failed to replace {} after {attempts} attempts", path.display())]
    CopyFailed {
        /// Install path.
        path: PathBuf,
        /// Attempts made.
        attempts: u32,
        /// Last error.
        #[source]
        source: io::Error,
    },

    /// The replaced file has a different size than the package.
    #[error("installed file is {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Package size.
        expected: u64,
        /// Size found at the install path.
        actual: u64,
    },

    /// Restoring the backup after a failed copy also failed.
    #[error("failed to restore {} from backup", path.display())]
    RestoreFailed {
        /// Install path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The platform has no reboot-deferred rename facility.
    #[error("deferred replacement on reboot is not supported on this platform")]
    RebootUnsupported,

    /// The OS refused to register the deferred rename.
    #[error("failed to schedule replacement on reboot")]
    RebootScheduleFailed(#[source] io::Error),

    /// The install state machine was driven out of order.
    #[error("invalid install transition from {from} to {to}")]
    InvalidTransition {
        /// Current state name.
        from: &'static str,
        /// Requested state name.
        to: &'static str,
    },

    /// The install plan could not be written, read or validated.
    #[error("install plan error: {0}")]
    Plan(String),

    /// The helper process could not be started.
    #[error("failed to launch install helper")]
    Spawn(#[source] io::Error),

    /// Any other filesystem failure during preparation.
    #[error("I/O error during install")]
    Io(#[from] io::Error),
}

impl InstallError {
    /// Stable code written into the `{error}` status marker.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockTimeout { .. } => "lock_timeout",
            Self::BackupFailed { .. } => "backup_failed",
            Self::CopyFailed { .. } => "copy_failed",
            Self::SizeMismatch { .. } => "size_mismatch",
            Self::RestoreFailed { .. } => "restore_failed",
            Self::RebootUnsupported => "reboot_unsupported",
            Self::RebootScheduleFailed(_) => "reboot_schedule_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Plan(_) => "plan_error",
            Self::Spawn(_) => "spawn_failed",
            Self::Io(_) => "io_error",
        }
    }

    /// Whether the failure came from the OS refusing access to the install path.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::BackupFailed { source, .. } | Self::CopyFailed { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

/// Errors from the per-user autostart registry.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Reading, writing or removing the entry failed.
    #[error("failed to {action} autostart entry '{name}'")]
    Io {
        /// What was being done (`read`, `write`, `remove`).
        action: &'static str,
        /// Entry name.
        name: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The running executable's path could not be determined.
    #[error("cannot determine the application executable path")]
    Executable(#[source] io::Error),

    /// No per-user autostart facility is known for this platform.
    #[error("autostart is not supported on this platform")]
    Unsupported,
}

/// Error wrapper with a suggestion and details for terminal output.
#[derive(Debug)]
pub struct ErrorContext {
    /// The rendered error chain.
    pub message: String,
    /// Optional suggestion for resolving the error.
    pub suggestion: Option<String>,
    /// Optional additional details.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wraps a message with no suggestion or details.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Adds a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Adds details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error to stderr with colours.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Converts any error into an [`ErrorContext`] with a suggestion where one is known.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let message = format!("{error:#}");

    if let Some(e) = error.downcast_ref::<GuardError>() {
        if let GuardError::Bind { addr, .. } = e {
            return ErrorContext::new(message)
                .with_suggestion(format!(
                    "Check whether another program reserved {addr}; the port is only used as an instance lock"
                ));
        }
        return ErrorContext::new(message);
    }

    if let Some(e) = error.downcast_ref::<CheckError>() {
        let ctx = ErrorContext::new(message);
        return match e {
            CheckError::RateLimited { .. } => ctx
                .with_suggestion("Wait a few minutes before checking again")
                .with_details("The release endpoint limits unauthenticated requests per hour"),
            CheckError::Network(_) | CheckError::Timeout => {
                ctx.with_suggestion("Check your internet connection and proxy settings")
            }
            _ => ctx,
        };
    }

    if let Some(e) = error.downcast_ref::<FetchError>() {
        let ctx = ErrorContext::new(message);
        return match e {
            FetchError::ChecksumMismatch { .. } => ctx
                .with_suggestion("Retry the update; if it keeps failing download the release manually")
                .with_details("The downloaded package was discarded and never handed to the installer"),
            FetchError::ChecksumMissing => ctx.with_suggestion(
                "Set update.verify_policy = \"permissive\" to accept releases without a checksum",
            ),
            _ => ctx,
        };
    }

    if let Some(e) = error.downcast_ref::<InstallError>() {
        let ctx = ErrorContext::new(message);
        return match e {
            InstallError::RebootUnsupported => ctx.with_suggestion(
                "Close the application and replace the executable manually",
            ),
            _ => ctx.with_details(
                "The previous executable is left in place and remains launchable",
            ),
        };
    }

    if let Some(e) = error.downcast_ref::<RegistrationError>() {
        return ErrorContext::new(message).with_details(match e {
            RegistrationError::Unsupported => {
                "Start the application manually or through your desktop environment"
            }
            _ => "The application keeps running without autostart",
        });
    }

    if let Some(io_error) = error.downcast_ref::<io::Error>()
        && io_error.kind() == io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(message)
            .with_suggestion("Check ownership and permissions of the installation directory");
    }

    ErrorContext::new(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_error_transience() {
        assert!(CheckError::RateLimited { status: 429 }.is_transient());
        assert!(CheckError::Server { status: 503 }.is_transient());
        assert!(
            !CheckError::NotFound {
                url: "https://example.invalid".into()
            }
            .is_transient()
        );
        assert!(!CheckError::Parse("bad json".into()).is_transient());
    }

    #[test]
    fn test_check_error_categories() {
        assert_eq!(CheckError::RateLimited { status: 403 }.category(), "rate_limit");
        assert_eq!(CheckError::Timeout.category(), "timeout");
        assert_eq!(CheckError::Parse(String::new()).category(), "parse");
    }

    #[test]
    fn test_install_error_codes_are_stable() {
        let io = || io::Error::other("locked");
        assert_eq!(
            InstallError::LockTimeout {
                pid: 1,
                waited: Duration::from_secs(30)
            }
            .code(),
            "lock_timeout"
        );
        assert_eq!(
            InstallError::BackupFailed {
                path: PathBuf::from("app"),
                attempts: 5,
                source: io()
            }
            .code(),
            "backup_failed"
        );
        assert_eq!(
            InstallError::CopyFailed {
                path: PathBuf::from("app"),
                attempts: 5,
                source: io()
            }
            .code(),
            "copy_failed"
        );
        assert_eq!(
            InstallError::SizeMismatch {
                expected: 2,
                actual: 1
            }
            .code(),
            "size_mismatch"
        );
    }

    #[test]
    fn test_permission_denied_detection() {
        let denied = InstallError::CopyFailed {
            path: PathBuf::from("app"),
            attempts: 5,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(denied.is_permission_denied());

        let other = InstallError::CopyFailed {
            path: PathBuf::from("app"),
            attempts: 5,
            source: io::Error::other("busy"),
        };
        assert!(!other.is_permission_denied());
    }

    #[test]
    fn test_user_friendly_checksum_mismatch() {
        let err = anyhow::Error::from(FetchError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        });
        let ctx = user_friendly_error(err);
        assert!(ctx.message.contains("checksum mismatch"));
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new("boom")
            .with_details("something broke")
            .with_suggestion("try again");
        let rendered = ctx.to_string();
        assert!(rendered.contains("boom"));
        assert!(rendered.contains("Details: something broke"));
        assert!(rendered.contains("Suggestion: try again"));
    }
}
