//! Locked read-modify-write access to the configuration file.

use super::{AppConfig, ConfigError};
use crate::utils::fs::atomic_write;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The configuration store.
///
/// Every operation takes an exclusive lock on `<config>.lock` for its whole
/// duration, so a `modify` from the running application and one from the
/// install routine never interleave. Writes go through write-then-rename.
///
/// A missing file reads as [`AppConfig::default`]. A file that fails to parse is
/// logged and also read as defaults; it is replaced on the next write.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `path`, or at [`AppConfig::default_path`] when `None`.
    pub fn open(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Ok(Self::new(path)),
            None => AppConfig::default_path().map(Self::new),
        }
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let _lock = self.lock()?;
        self.read_unlocked()
    }

    /// Apply `f` to the current record and persist the result atomically.
    ///
    /// Returns whatever `f` returns together with the saved record.
    pub fn modify<T>(
        &self,
        f: impl FnOnce(&mut AppConfig) -> T,
    ) -> Result<(T, AppConfig), ConfigError> {
        let _lock = self.lock()?;
        let mut config = self.read_unlocked()?;
        let value = f(&mut config);
        self.write_unlocked(&config)?;
        Ok((value, config))
    }

    fn lock(&self) -> Result<File, ConfigError> {
        let lock_path = self.lock_path();
        let lock_err = |source| ConfigError::Lock {
            path: lock_path.clone(),
            source,
        };

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        Ok(file)
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "config.toml".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn read_unlocked(&self) -> Result<AppConfig, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No configuration file, using defaults");
                return Ok(AppConfig::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Configuration is corrupt, using defaults");
                Ok(AppConfig::default())
            }
        }
    }

    fn write_unlocked(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;
        atomic_write(&self.path, content.as_bytes()).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
