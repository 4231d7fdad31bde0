//! Startup reconciliation of the last install attempt.
//!
//! Runs once per startup, before any update check. Every status marker is read
//! and deleted in one pass ([`reconcile`]); the result is then surfaced to the
//! user through a [`Notifier`] ([`OutcomeReconciler::surface`]).

use super::reboot::{RebootScheduler, schedule_pending};
use crate::constants::DOWNLOAD_DIR_PREFIX;
use crate::markers::{ErrorMarker, MarkerStore};
use crate::notify::{FailureChoice, Notifier};
use crate::version::AppVersion;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the markers of the previous attempt say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing to report.
    Silent,
    /// `version` was installed.
    Succeeded {
        /// Installed version.
        version: AppVersion,
        /// Version the parent handed off, when recorded.
        expected: Option<AppVersion>,
    },
    /// The install aborted.
    Failed {
        /// Reported failure.
        error: ErrorMarker,
        /// Downloaded package kept for a retry.
        pending: Option<PathBuf>,
    },
    /// A package awaits the reboot-deferred replacement.
    PendingReboot {
        /// Downloaded package.
        package: PathBuf,
    },
}

/// What the user chose, or what happened without asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing was shown.
    Nothing,
    /// An informational notice was shown.
    Notified,
    /// The replacement was scheduled for next boot.
    RebootScheduled,
    /// The download page was opened.
    DownloadPageOpened,
    /// The prompt was dismissed.
    Dismissed,
}

/// Consume every marker and classify the previous attempt.
///
/// `running` is the version of this process; it corroborates an expected
/// version when one was recorded.
pub fn reconcile(markers: &MarkerStore, running: &AppVersion) -> Reconciliation {
    let set = markers.take();
    if set.is_empty() {
        debug!("No update markers present");
        return Reconciliation::Silent;
    }

    if let Some(version) = set.success {
        if let Some(expected) = &set.expected {
            if expected != running {
                warn!(
                    expected = %expected,
                    running = %running,
                    "Running version differs from the version that was installed"
                );
            } else {
                debug!(version = %running, "Installed version confirmed");
            }
        }
        if set.error.is_some() {
            warn!("Both success and error markers present, reporting success");
        }
        return Reconciliation::Succeeded {
            version,
            expected: set.expected,
        };
    }

    if let Some(error) = set.error {
        return Reconciliation::Failed {
            error,
            pending: set.pending,
        };
    }

    if let Some(package) = set.pending {
        return Reconciliation::PendingReboot { package };
    }

    if let Some(expected) = set.expected {
        warn!(
            expected = %expected,
            running = %running,
            "An update was handed off but the install routine left no result"
        );
    }
    Reconciliation::Silent
}

/// Shows a [`Reconciliation`] to the user and acts on the answer.
pub struct OutcomeReconciler {
    markers: MarkerStore,
    notifier: Arc<dyn Notifier>,
    reboot: Arc<dyn RebootScheduler>,
    install_path: PathBuf,
    releases_page_url: String,
    success_delay: Duration,
}

impl OutcomeReconciler {
    pub fn new(
        markers: MarkerStore,
        notifier: Arc<dyn Notifier>,
        reboot: Arc<dyn RebootScheduler>,
        install_path: PathBuf,
        releases_page_url: impl Into<String>,
    ) -> Self {
        Self {
            markers,
            notifier,
            reboot,
            install_path,
            releases_page_url: releases_page_url.into(),
            success_delay: crate::constants::SUCCESS_NOTICE_DELAY,
        }
    }

    /// Override the delay before the success notice.
    pub fn with_success_delay(mut self, delay: Duration) -> Self {
        self.success_delay = delay;
        self
    }

    /// Surface `reconciliation`. Prompts block, so they run on the blocking
    /// pool.
    pub async fn surface(&self, reconciliation: Reconciliation) -> Resolution {
        match reconciliation {
            Reconciliation::Silent => Resolution::Nothing,
            Reconciliation::Succeeded { version, .. } => {
                tokio::time::sleep(self.success_delay).await;
                info!(version = %version, "Update installed");
                self.notifier
                    .notice(&format!("Updated successfully to version {version}."));
                Resolution::Notified
            }
            Reconciliation::Failed { error, pending } => {
                let package = pending.filter(|p| p.is_file());
                let notifier = self.notifier.clone();
                let can_reboot = package.is_some();
                let marker = error.clone();
                let choice = tokio::task::spawn_blocking(move || {
                    notifier.prompt_failure(&marker, can_reboot)
                })
                .await
                .unwrap_or(FailureChoice::Dismiss);
                self.resolve_failure(choice, package.as_deref())
            }
            Reconciliation::PendingReboot { package } => {
                if !package.is_file() {
                    debug!(package = %package.display(), "Pending package is gone");
                    return Resolution::Nothing;
                }
                let notifier = self.notifier.clone();
                let shown = package.clone();
                let accepted =
                    tokio::task::spawn_blocking(move || notifier.prompt_finalize(&shown))
                        .await
                        .unwrap_or(false);
                if accepted {
                    self.schedule(&package)
                } else {
                    self.keep_scheduled(&package)
                }
            }
        }
    }

    fn resolve_failure(&self, choice: FailureChoice, package: Option<&Path>) -> Resolution {
        match (choice, package) {
            (FailureChoice::ScheduleReboot, Some(package)) => self.schedule(package),
            (FailureChoice::OpenDownloadPage, _) => {
                if let Some(package) = package {
                    discard_package(package);
                }
                if let Err(e) = self.notifier.open_url(&self.releases_page_url) {
                    warn!(url = %self.releases_page_url, error = %e, "Cannot open download page");
                }
                Resolution::DownloadPageOpened
            }
            (_, package) => {
                if let Some(package) = package {
                    discard_package(package);
                }
                Resolution::Dismissed
            }
        }
    }

    /// A pending marker is only written once the OS holds a rename of
    /// `package`, so declining keeps both the package and the marker.
    fn keep_scheduled(&self, package: &Path) -> Resolution {
        if let Err(e) = self.markers.write_pending(package) {
            warn!(error = %e, "Failed to keep pending marker");
        }
        info!(package = %package.display(), "Leaving scheduled replacement in place");
        self.notifier.notice(&format!(
            "The update stays scheduled for the next restart. Delete {} to cancel it.",
            package.display()
        ));
        Resolution::Dismissed
    }

    fn schedule(&self, package: &Path) -> Resolution {
        match schedule_pending(
            self.reboot.as_ref(),
            &self.markers,
            package,
            &self.install_path,
        ) {
            Ok(()) => {
                self.notifier
                    .notice("The update will be installed on the next restart.");
                Resolution::RebootScheduled
            }
            Err(e) => {
                warn!(error = %e, "Cannot schedule reboot replacement");
                self.notifier.notice(&format!(
                    "Could not schedule the update: {e}. Download it manually from {}",
                    self.releases_page_url
                ));
                Resolution::Dismissed
            }
        }
    }
}

/// Delete the download directory holding `package`, but only one this crate
/// created.
fn discard_package(package: &Path) {
    let Some(dir) = package.parent() else {
        return;
    };
    let owned = dir
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(DOWNLOAD_DIR_PREFIX));
    if !owned {
        debug!(package = %package.display(), "Leaving package outside a download directory");
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!(path = %dir.display(), error = %e, "Cannot remove download directory");
    }
}
