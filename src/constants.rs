//! Global constants used throughout the lifeline codebase.
//!
//! This module contains timeout durations, retry parameters, well-known file
//! names and other numeric constants that are shared between the running
//! application and the external install routine. Both process generations are
//! built from the same source, so the marker protocol names defined here are
//! the contract between them.

use std::time::Duration;

/// Application name used for config directories, autostart entries and logs.
pub const APP_NAME: &str = "lifeline";

/// Loopback port used purely as the single-instance mutual-exclusion primitive.
///
/// Nothing is ever read from or written to this socket.
pub const LOCK_PORT: u16 = 47823;

/// Environment variable overriding the single-instance lock port.
pub const LOCK_PORT_ENV: &str = "LIFELINE_LOCK_PORT";

/// Default "latest release" endpoint queried by the update checker.
pub const DEFAULT_RELEASE_API_URL: &str =
    "https://api.github.com/repos/lifeline-app/lifeline/releases/latest";

/// Default page opened when the user chooses a manual download.
pub const DEFAULT_RELEASES_PAGE_URL: &str =
    "https://github.com/lifeline-app/lifeline/releases/latest";

/// User agent sent with every release query and download.
pub const USER_AGENT: &str = concat!("lifeline/", env!("CARGO_PKG_VERSION"));

/// Timeout for a single release-metadata request (30 seconds).
pub const CHECK_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of retries for transient release-query failures.
pub const CHECK_MAX_RETRIES: usize = 3;

/// First backoff delay for release-query retries; doubles on each retry.
pub const CHECK_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Hard upper bound on a complete package download (180 seconds).
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(180);

/// Connect timeout for individual download requests.
pub const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Size of the buffer the fetcher writes and reports progress in.
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum number of characters of release notes handed to callers.
pub const RELEASE_NOTES_MAX_LENGTH: usize = 500;

/// Prefix for temporary download directories.
pub const DOWNLOAD_DIR_PREFIX: &str = "lifeline_update_";

/// How long the install routine waits for the parent process to exit.
pub const PARENT_EXIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval at which the install routine polls for the parent process.
pub const PARENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Attempts for backup and replacement copies in the install routine.
pub const COPY_MAX_ATTEMPTS: u32 = 5;

/// Fixed delay between copy attempts in the install routine.
pub const COPY_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Delay before the success notification after an update (≈2 seconds).
pub const SUCCESS_NOTICE_DELAY: Duration = Duration::from_secs(2);

/// Default delay before the background startup update check.
pub const DEFAULT_STARTUP_CHECK_DELAY_SECS: u64 = 5;

/// Environment variable set on a process image re-executed by the version gate.
pub const RESTARTED_ENV: &str = "LIFELINE_RESTARTED";

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "LIFELINE_CONFIG_PATH";

/// Environment variable overriding the status marker directory.
pub const MARKER_DIR_ENV: &str = "LIFELINE_MARKER_DIR";

/// Environment variable overriding the per-user autostart directory
/// (XDG autostart on Linux, LaunchAgents on macOS).
pub const AUTOSTART_DIR_ENV: &str = "LIFELINE_AUTOSTART_DIR";

/// File name of the install plan written next to a downloaded package.
pub const INSTALL_PLAN_FILE: &str = "install-plan.json";

/// Log file written by the external install routine inside the marker directory.
pub const INSTALLER_LOG_FILE: &str = "lifeline-installer.log";

/// Suffix of the backup kept next to the installed executable during a swap.
pub const BACKUP_SUFFIX: &str = "bak";
