//! Package fetcher: stream a release asset to disk and verify it.
//!
//! The package is written into a fresh `lifeline_update_*` temporary directory.
//! The directory is owned by a [`tempfile::TempDir`] until the download has been
//! verified, so every failure path (timeout, cancellation, HTTP error, checksum
//! mismatch) removes the partial or corrupt file automatically. Only a verified
//! package survives and is handed to the install orchestrator.

use super::release::UpdatePackage;
use super::verification::{ChecksumVerifier, StreamingHasher};
use crate::config::VerifyPolicy;
use crate::constants::{
    DOWNLOAD_CHUNK_SIZE, DOWNLOAD_CONNECT_TIMEOUT, DOWNLOAD_DIR_PREFIX, DOWNLOAD_TIMEOUT, USER_AGENT,
};
use crate::core::FetchError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A downloaded package that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPackage {
    /// The package file.
    pub path: PathBuf,
    /// The temporary directory holding it. Removed after a successful install.
    pub dir: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Whether a published checksum was verified.
    pub verified: bool,
}

/// Downloads update packages.
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    client: reqwest::Client,
    timeout: Duration,
    policy: VerifyPolicy,
    download_root: Option<PathBuf>,
}

impl PackageFetcher {
    /// Fetcher with the default hard timeout.
    pub fn new(policy: VerifyPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT)
            .build()
            .map_err(FetchError::Network)?;

        Ok(Self {
            client,
            timeout: DOWNLOAD_TIMEOUT,
            policy,
            download_root: None,
        })
    }

    /// Override the hard timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create download directories under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_download_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.download_root = Some(root.into());
        self
    }

    /// Download `package`, reporting progress in percent after each chunk.
    ///
    /// `cancel` is checked between chunks; a cancelled or failed download
    /// leaves nothing behind.
    pub async fn fetch(
        &self,
        package: &UpdatePackage,
        mut on_progress: impl FnMut(u8) + Send,
        cancel: &CancellationToken,
    ) -> Result<FetchedPackage, FetchError> {
        if package.checksum.is_none() {
            match self.policy {
                VerifyPolicy::RequireChecksum => return Err(FetchError::ChecksumMissing),
                VerifyPolicy::Permissive => warn!(
                    version = %package.version,
                    "Release publishes no checksum; the package will not be verified"
                ),
            }
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(DOWNLOAD_DIR_PREFIX);
        let dir = match &self.download_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().join(file_name_for(&package.asset_name));

        let size = tokio::time::timeout(
            self.timeout,
            self.download(package, &path, &mut on_progress, cancel),
        )
        .await
        .map_err(|_| FetchError::Timeout {
            after: self.timeout,
        })??;

        set_executable(&path)?;
        let dir = dir.keep();
        info!(path = %path.display(), size, "Package downloaded");

        Ok(FetchedPackage {
            path,
            dir,
            size,
            verified: package.checksum.is_some(),
        })
    }

    async fn download(
        &self,
        package: &UpdatePackage,
        path: &Path,
        on_progress: &mut (impl FnMut(u8) + Send),
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        debug!(url = %package.download_url, "Starting download");
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.client.get(&package.download_url).send() => {
                response.map_err(map_network)?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let total = response.content_length().or(package.size).unwrap_or(0);
        let mut stream = response.bytes_stream();
        let mut file = File::create(path).await?;
        let mut hasher = StreamingHasher::new();
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                next = stream.next() => next,
            };
            let Some(bytes) = next else {
                break;
            };
            let bytes = bytes.map_err(map_network)?;

            for chunk in bytes.chunks(DOWNLOAD_CHUNK_SIZE) {
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }
                file.write_all(chunk).await?;
                hasher.update(chunk);
                written += chunk.len() as u64;
                on_progress(percent(written, total));
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = &package.checksum {
            ChecksumVerifier::verify_digest(&hasher.finalize(), expected)?;
        }

        on_progress(100);
        Ok(written)
    }
}

fn map_network(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            after: DOWNLOAD_CONNECT_TIMEOUT,
        }
    } else {
        FetchError::Network(error)
    }
}

fn percent(written: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from((written.saturating_mul(100) / total).min(100)).unwrap_or(100)
}

/// Final path component of an asset name, never empty.
fn file_name_for(asset_name: &str) -> String {
    Path::new(asset_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "lifeline-update".to_string())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
