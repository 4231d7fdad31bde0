//! Backup, replacement and rollback of the installed executable.
//!
//! The install routine keeps a sibling copy of the executable (`lifeline.bak`,
//! `lifeline.exe.bak`) for the duration of a swap. Every copy is retried under a
//! [`RetryPolicy`] because the file may still be held briefly by antivirus
//! scanners or by the OS after the parent exits.
//!
//! File access goes through [`FileOps`] so tests can inject failures at exact
//! points of the sequence.

use crate::constants::{BACKUP_SUFFIX, COPY_MAX_ATTEMPTS, COPY_RETRY_DELAY};
use crate::core::InstallError;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Filesystem primitives used by the install routine.
pub trait FileOps: Send + Sync {
    /// Copy `from` over `to`, returning the bytes copied.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Size of a file in bytes.
    fn size(&self, path: &Path) -> io::Result<u64>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// [`FileOps`] backed by `std::fs`. Copies keep the source permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        std::fs::metadata(path).map(|m| m.len())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Fixed-delay retry policy for file copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause between attempts.
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: COPY_MAX_ATTEMPTS,
            delay: COPY_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// On exhaustion returns the number of attempts made and the last error.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> io::Result<T>,
    ) -> Result<T, (u32, io::Error)> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "{what} failed, retrying");
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => return Err((attempt, e)),
            }
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Manages the `.bak` sibling of the installed executable.
pub struct BackupManager<'a> {
    original_path: PathBuf,
    backup_path: PathBuf,
    ops: &'a dyn FileOps,
    policy: RetryPolicy,
}

impl<'a> BackupManager<'a> {
    /// Manager for `executable_path`.
    pub fn new(executable_path: PathBuf, ops: &'a dyn FileOps, policy: RetryPolicy) -> Self {
        let backup_path = backup_path_for(&executable_path);
        Self {
            original_path: executable_path,
            backup_path,
            ops,
            policy,
        }
    }

    /// Copy the current executable to the backup path.
    pub fn create_backup(&self) -> Result<(), InstallError> {
        info!(path = %self.backup_path.display(), "Creating backup");
        self.policy
            .run("Backup copy", || {
                self.ops.copy(&self.original_path, &self.backup_path)
            })
            .map(|_| ())
            .map_err(|(attempts, source)| InstallError::BackupFailed {
                path: self.original_path.clone(),
                attempts,
                source,
            })
    }

    /// Copy `package` over the executable and check the result is `expected_size` bytes.
    pub fn replace_with(&self, package: &Path, expected_size: u64) -> Result<(), InstallError> {
        info!(
            from = %package.display(),
            to = %self.original_path.display(),
            "Replacing executable"
        );
        self.policy
            .run("Replacement copy", || self.ops.copy(package, &self.original_path))
            .map_err(|(attempts, source)| InstallError::CopyFailed {
                path: self.original_path.clone(),
                attempts,
                source,
            })?;

        let actual = self.ops.size(&self.original_path)?;
        if actual != expected_size {
            return Err(InstallError::SizeMismatch {
                expected: expected_size,
                actual,
            });
        }
        debug!(size = actual, "Replacement size verified");
        Ok(())
    }

    /// Copy the backup back over the executable.
    pub fn restore_backup(&self) -> Result<(), InstallError> {
        warn!(path = %self.backup_path.display(), "Restoring from backup");
        self.policy
            .run("Restore copy", || {
                self.ops.copy(&self.backup_path, &self.original_path)
            })
            .map(|_| info!("Successfully restored from backup"))
            .map_err(|(_, source)| InstallError::RestoreFailed {
                path: self.original_path.clone(),
                source,
            })
    }

    /// Delete the backup. Absence is not an error.
    pub fn cleanup_backup(&self) {
        match self.ops.remove(&self.backup_path) {
            Ok(()) => debug!(path = %self.backup_path.display(), "Removed backup"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.backup_path.display(), error = %e, "Failed to remove backup"),
        }
    }

    /// Backup location.
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }
}

/// `<executable>.bak`.
pub fn backup_path_for(executable: &Path) -> PathBuf {
    let mut name = executable
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(BACKUP_SUFFIX);
    executable.with_file_name(name)
}
