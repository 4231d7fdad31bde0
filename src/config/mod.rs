//! Persistent application configuration.
//!
//! The configuration record lives in `config.toml` under the platform config
//! directory (`~/.config/lifeline/config.toml` on Linux,
//! `%APPDATA%\lifeline\config.toml` on Windows). The location can be overridden
//! with the `LIFELINE_CONFIG_PATH` environment variable or the `--config` flag.
//!
//! ```toml
//! autostart = true
//! auto_check_updates = true
//! last_run_version = "1.9.7"
//!
//! [update]
//! release_api_url = "https://api.github.com/repos/lifeline-app/lifeline/releases/latest"
//! verify_policy = "permissive"
//! startup_check_delay_secs = 5
//!
//! [gate]
//! cache_dirs = ["/home/user/.cache/lifeline/bytecode"]
//!
//! [update_stats]
//! total_checks = 12
//! successful_checks = 11
//! failed_checks = 1
//!
//! [update_stats.error_counts]
//! network = 1
//! ```
//!
//! All mutation goes through [`ConfigStore`], which serialises concurrent
//! read-modify-write cycles across processes with a sidecar lock file.

mod store;

pub use store::ConfigStore;

use crate::constants::{
    APP_NAME, CONFIG_PATH_ENV, DEFAULT_RELEASE_API_URL, DEFAULT_RELEASES_PAGE_URL,
    DEFAULT_STARTUP_CHECK_DELAY_SECS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or saving the configuration record.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform config directory and no override.
    #[error("cannot determine the configuration directory; set {CONFIG_PATH_ENV}")]
    NoConfigDir,

    /// The lock file could not be opened or locked.
    #[error("failed to lock configuration at {}", path.display())]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the configuration failed for a reason other than absence.
    #[error("failed to read configuration at {}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialising the record failed.
    #[error("failed to serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    /// Writing the record failed.
    #[error("failed to write configuration at {}", path.display())]
    Write {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
}

/// The whole configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mirror of the last autostart choice. The live registry remains the
    /// source of truth for display.
    pub autostart: bool,

    /// Check for updates in the background after startup.
    pub auto_check_updates: bool,

    /// Version of the binary that last completed startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_version: Option<String>,

    /// Update source and verification settings.
    pub update: UpdateSettings,

    /// Version gate settings.
    pub gate: GateSettings,

    /// Update check counters.
    pub update_stats: UpdateStats,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            auto_check_updates: true,
            last_run_version: None,
            update: UpdateSettings::default(),
            gate: GateSettings::default(),
            update_stats: UpdateStats::default(),
        }
    }
}

impl AppConfig {
    /// Default configuration file location.
    ///
    /// `LIFELINE_CONFIG_PATH` wins over the platform config directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }

        dirs::config_dir()
            .map(|dir| dir.join(APP_NAME).join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }
}

/// How a release without a published checksum is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    /// Accept unverified packages with a warning.
    #[default]
    Permissive,
    /// Reject packages without a checksum.
    RequireChecksum,
}

/// The `[update]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// "Latest release" metadata endpoint.
    pub release_api_url: String,

    /// Page opened for a manual download.
    pub releases_page_url: String,

    /// Regex selecting the installable asset. Empty means the platform default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_pattern: Option<String>,

    /// Treatment of releases without a checksum.
    pub verify_policy: VerifyPolicy,

    /// Delay before the background startup check.
    pub startup_check_delay_secs: u64,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            release_api_url: DEFAULT_RELEASE_API_URL.to_string(),
            releases_page_url: DEFAULT_RELEASES_PAGE_URL.to_string(),
            asset_pattern: None,
            verify_policy: VerifyPolicy::default(),
            startup_check_delay_secs: DEFAULT_STARTUP_CHECK_DELAY_SECS,
        }
    }
}

impl UpdateSettings {
    /// Startup check delay as a [`Duration`].
    pub fn startup_check_delay(&self) -> Duration {
        Duration::from_secs(self.startup_check_delay_secs)
    }
}

/// The `[gate]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Compiled-artifact cache directories removed on a version transition.
    pub cache_dirs: Vec<PathBuf>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            cache_dirs: dirs::cache_dir()
                .map(|dir| vec![dir.join(APP_NAME).join("compiled")])
                .unwrap_or_default(),
        }
    }
}

/// Update check counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateStats {
    /// Every completed check.
    pub total_checks: u64,
    /// Checks that produced an answer (update or no update).
    pub successful_checks: u64,
    /// Checks that failed.
    pub failed_checks: u64,
    /// Failures per error category.
    pub error_counts: BTreeMap<String, u64>,
    /// Time of the last check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    /// Time of the last successful check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
}

impl UpdateStats {
    /// Record one check. `failure_category` is `None` on success.
    pub fn record_check(&mut self, failure_category: Option<&str>) {
        let now = Utc::now();
        self.total_checks += 1;
        self.last_check = Some(now);

        match failure_category {
            None => {
                self.successful_checks += 1;
                self.last_success = Some(now);
            }
            Some(category) => {
                self.failed_checks += 1;
                *self.error_counts.entry(category.to_string()).or_insert(0) += 1;
            }
        }
    }
}
