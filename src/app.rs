//! The application host: the startup sequence and its background work.
//!
//! Startup runs strictly in this order:
//!
//! 1. Process guard. A second instance notifies and exits with status 0.
//! 2. Version gate. A version transition ends startup with
//!    [`Outcome::Restart`]; nothing else runs in this image.
//! 3. Outcome reconciler. Markers are consumed before any update check.
//! 4. Optional background update check after the configured delay.
//!
//! The host then idles until Ctrl-C.

use crate::config::{AppConfig, ConfigStore, UpdateSettings};
use crate::core::{CheckError, GuardError, Outcome};
use crate::gate::{self, GateContext};
use crate::guard;
use crate::markers::MarkerStore;
use crate::notify::Notifier;
use crate::upgrade::reboot::PlatformReboot;
use crate::upgrade::{CheckOutcome, OutcomeReconciler, UpdateChecker, reconcile};
use crate::version::AppVersion;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Collaborators of the application host.
#[derive(Clone)]
pub struct App {
    store: ConfigStore,
    markers: MarkerStore,
    notifier: Arc<dyn Notifier>,
    current: AppVersion,
    success_delay: Option<Duration>,
}

impl App {
    /// Host for the running binary version.
    pub fn new(store: ConfigStore, markers: MarkerStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            markers,
            notifier,
            current: AppVersion::current(),
            success_delay: None,
        }
    }

    /// Pretend to be `version` instead of the compiled-in version.
    #[must_use]
    pub fn with_version(mut self, version: AppVersion) -> Self {
        self.current = version;
        self
    }

    /// Override the delay before the post-update success notice.
    #[must_use]
    pub fn with_success_delay(mut self, delay: Duration) -> Self {
        self.success_delay = Some(delay);
        self
    }

    /// Run the startup sequence and, unless `once`, idle until Ctrl-C.
    ///
    /// With `once` the host waits for its startup work (reconciliation and the
    /// background check) and returns.
    pub async fn run(&self, context: &GateContext, once: bool) -> Result<Outcome> {
        let _lock = match guard::acquire() {
            Ok(lock) => lock,
            Err(GuardError::AlreadyRunning { port }) => {
                info!(port, "Another instance holds the lock");
                self.notifier.notice("lifeline is already running.");
                return Ok(Outcome::Exit(0));
            }
            Err(e) => return Err(e).context("Failed to acquire the single-instance lock"),
        };

        let outcome = gate::check_and_maybe_restart(&self.store, &self.current, context)
            .context("Version gate failed")?;
        if !outcome.is_continue() {
            return Ok(outcome);
        }

        let config = self.store.load().context("Failed to load configuration")?;
        let reconciling = self.spawn_reconciler(&config);
        let checking = config
            .auto_check_updates
            .then(|| self.spawn_startup_check(config.update.clone()));

        info!(version = %self.current, "lifeline is running");
        if once {
            for task in std::iter::once(reconciling).chain(checking) {
                if let Err(e) = task.await {
                    warn!(error = %e, "Startup task panicked");
                }
            }
            return Ok(Outcome::Exit(0));
        }

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Shutting down");
        Ok(Outcome::Exit(0))
    }

    fn spawn_reconciler(&self, config: &AppConfig) -> JoinHandle<()> {
        let reconciliation = reconcile(&self.markers, &self.current);
        let install_path = std::env::current_exe().unwrap_or_default();
        let mut reconciler = OutcomeReconciler::new(
            self.markers.clone(),
            self.notifier.clone(),
            Arc::new(PlatformReboot),
            install_path,
            config.update.releases_page_url.clone(),
        );
        if let Some(delay) = self.success_delay {
            reconciler = reconciler.with_success_delay(delay);
        }

        tokio::spawn(async move {
            let resolution = reconciler.surface(reconciliation).await;
            debug!(?resolution, "Startup reconciliation finished");
        })
    }

    fn spawn_startup_check(&self, settings: UpdateSettings) -> JoinHandle<()> {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let current = self.current.clone();

        tokio::spawn(async move {
            tokio::time::sleep(settings.startup_check_delay()).await;
            match check_and_record(&store, &settings, &current, Uuid::new_v4()).await {
                Ok(CheckOutcome::Available(package)) => notifier.update_available(&package),
                Ok(CheckOutcome::NoUpdate { .. }) => {}
                Err(e) => debug!(error = %e, "Startup update check failed"),
            }
        })
    }
}

/// Run one update check and record it in the update statistics.
///
/// Statistics failures are logged; they never change the check result.
pub async fn check_and_record(
    store: &ConfigStore,
    settings: &UpdateSettings,
    current: &AppVersion,
    attempt_id: Uuid,
) -> Result<CheckOutcome, CheckError> {
    let span = info_span!("update_check", attempt_id = %attempt_id);
    async {
        let result = match UpdateChecker::from_settings(settings) {
            Ok(checker) => checker.check(current).await,
            Err(e) => Err(e),
        };

        let category = result.as_ref().err().map(CheckError::category);
        if let Err(e) = store.modify(|config| config.update_stats.record_check(category)) {
            warn!(error = %e, "Failed to record update statistics");
        }
        result
    }
    .instrument(span)
    .await
}
