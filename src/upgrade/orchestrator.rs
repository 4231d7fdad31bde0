//! Install orchestrator: hand a verified package to the external install routine.
//!
//! The running executable cannot replace itself, so the orchestrator only
//! prepares the swap and launches a helper process that performs it after this
//! process has exited:
//!
//! ```text
//! Idle ──request()──▶ Requested ──launch()──▶ ExternalRoutineLaunched
//!                                                   │ (helper process)
//!                                   ┌───────────────┼────────────────┐
//!                                   ▼               ▼                ▼
//!                               Succeeded         Failed       AwaitingReboot
//! ```
//!
//! `request` writes the expected-version marker, stages a copy of the current
//! binary into the download directory as the helper (so the install path is
//! never the running image) and writes `install-plan.json`. `launch` starts the
//! helper windowless and returns [`Outcome::Exit`]: once launched, the hand-off
//! cannot be cancelled and the caller must exit promptly.

use super::backup::RetryPolicy;
use super::fetcher::FetchedPackage;
use super::process::Launcher;
use crate::constants::{INSTALL_PLAN_FILE, PARENT_EXIT_TIMEOUT, PARENT_POLL_INTERVAL};
use crate::core::{InstallError, Outcome};
use crate::markers::MarkerStore;
use crate::utils::fs::atomic_write;
use crate::version::AppVersion;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// States of one update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Nothing requested yet.
    Idle,
    /// Plan written, helper staged.
    Requested,
    /// Helper running; the parent must exit.
    ExternalRoutineLaunched,
    /// New executable installed and launched.
    Succeeded,
    /// Aborted; the previous executable is in place.
    Failed,
    /// Replacement deferred to the next boot.
    AwaitingReboot,
}

impl InstallState {
    /// Whether the attempt has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::AwaitingReboot)
    }

    /// Move to `next` if the transition is allowed.
    pub fn advance(self, next: Self) -> Result<Self, InstallError> {
        let allowed = matches!(
            (self, next),
            (Self::Idle, Self::Requested)
                | (Self::Requested, Self::ExternalRoutineLaunched)
                | (Self::Requested, Self::Failed)
                | (
                    Self::ExternalRoutineLaunched,
                    Self::Succeeded | Self::Failed | Self::AwaitingReboot
                )
        );
        if !allowed {
            return Err(InstallError::InvalidTransition {
                from: self.name(),
                to: next.name(),
            });
        }
        Ok(next)
    }

    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requested => "requested",
            Self::ExternalRoutineLaunched => "external_routine_launched",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::AwaitingReboot => "awaiting_reboot",
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the install routine needs, written as `install-plan.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPlan {
    /// Correlation id of the update attempt.
    pub attempt_id: String,
    /// Process the routine waits for.
    pub parent_pid: u32,
    /// Executable being replaced.
    pub install_path: PathBuf,
    /// Verified package.
    pub package_path: PathBuf,
    /// Download directory, removed on success.
    pub work_dir: PathBuf,
    /// Version being installed.
    pub version: AppVersion,
    /// Exact package size.
    pub expected_size: u64,
    /// Arguments for relaunching the application.
    pub relaunch_args: Vec<String>,
    /// Marker directory shared with the next startup.
    pub marker_dir: PathBuf,
    /// Maximum wait for the parent to exit, in milliseconds.
    pub parent_timeout_ms: u64,
    /// Parent polling interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Retry policy for backup, replacement and restore copies.
    pub copy_policy: RetryPolicy,
    /// Try the reboot-deferred replacement when access is denied.
    pub reboot_fallback: bool,
}

impl InstallPlan {
    /// Parent wait timeout.
    pub fn parent_timeout(&self) -> Duration {
        Duration::from_millis(self.parent_timeout_ms)
    }

    /// Parent polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Read a plan file.
    pub fn load(path: &Path) -> Result<Self, InstallError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InstallError::Plan(format!("cannot read {}: {e}", path.display())))?;
        let plan: Self = serde_json::from_str(&content)
            .map_err(|e| InstallError::Plan(format!("cannot parse {}: {e}", path.display())))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Write the plan atomically.
    pub fn save(&self, path: &Path) -> Result<(), InstallError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| InstallError::Plan(e.to_string()))?;
        atomic_write(path, content.as_bytes())
            .map_err(|e| InstallError::Plan(format!("cannot write {}: {e:#}", path.display())))
    }

    fn validate(&self) -> Result<(), InstallError> {
        if !self.install_path.is_absolute() || !self.package_path.is_absolute() {
            return Err(InstallError::Plan("plan paths must be absolute".into()));
        }
        if self.install_path == self.package_path {
            return Err(InstallError::Plan("package and install path are the same file".into()));
        }
        Ok(())
    }
}

/// A prepared hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandOff {
    /// Staged helper executable.
    pub helper: PathBuf,
    /// Plan file passed to the helper.
    pub plan_path: PathBuf,
    /// The plan itself.
    pub plan: InstallPlan,
}

impl HandOff {
    /// Helper command-line arguments.
    pub fn helper_args(&self) -> Vec<OsString> {
        vec![
            "apply-update".into(),
            "--plan".into(),
            self.plan_path.clone().into_os_string(),
        ]
    }
}

/// Drives one update attempt up to the helper launch.
pub struct InstallOrchestrator {
    state: InstallState,
    attempt_id: Uuid,
    markers: MarkerStore,
    install_path: PathBuf,
    helper_source: PathBuf,
    parent_pid: u32,
    relaunch_args: Vec<String>,
    parent_timeout: Duration,
    poll_interval: Duration,
    copy_policy: RetryPolicy,
    reboot_fallback: bool,
}

impl InstallOrchestrator {
    /// Orchestrator replacing `install_path`, staging `helper_source` as the helper.
    pub fn new(
        attempt_id: Uuid,
        markers: MarkerStore,
        install_path: PathBuf,
        helper_source: PathBuf,
    ) -> Self {
        Self {
            state: InstallState::Idle,
            attempt_id,
            markers,
            install_path,
            helper_source,
            parent_pid: std::process::id(),
            relaunch_args: vec!["run".to_string()],
            parent_timeout: PARENT_EXIT_TIMEOUT,
            poll_interval: PARENT_POLL_INTERVAL,
            copy_policy: RetryPolicy::default(),
            reboot_fallback: cfg!(windows),
        }
    }

    /// Orchestrator for the running executable.
    pub fn for_current_exe(attempt_id: Uuid, markers: MarkerStore) -> Result<Self, InstallError> {
        let exe = std::env::current_exe()?;
        let exe = exe.canonicalize().unwrap_or(exe);
        Ok(Self::new(attempt_id, markers, exe.clone(), exe))
    }

    /// Arguments used to relaunch the application after the swap.
    #[must_use]
    pub fn relaunch_args(mut self, args: Vec<String>) -> Self {
        self.relaunch_args = args;
        self
    }

    /// Process the routine waits for.
    #[must_use]
    pub fn parent_pid(mut self, pid: u32) -> Self {
        self.parent_pid = pid;
        self
    }

    /// Copy retry policy.
    #[must_use]
    pub fn copy_policy(mut self, policy: RetryPolicy) -> Self {
        self.copy_policy = policy;
        self
    }

    /// Parent wait timing.
    #[must_use]
    pub fn parent_timing(mut self, timeout: Duration, interval: Duration) -> Self {
        self.parent_timeout = timeout;
        self.poll_interval = interval;
        self
    }

    /// Enable or disable the reboot-deferred fallback.
    #[must_use]
    pub fn reboot_fallback(mut self, enabled: bool) -> Self {
        self.reboot_fallback = enabled;
        self
    }

    /// Current state.
    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Prepare the hand-off for a verified package.
    pub fn request(
        &mut self,
        version: &AppVersion,
        fetched: &FetchedPackage,
    ) -> Result<HandOff, InstallError> {
        self.state.advance(InstallState::Requested)?;
        let prepared = self.prepare(version, fetched);
        self.state = match &prepared {
            Ok(_) => InstallState::Requested,
            Err(_) => InstallState::Idle,
        };
        prepared
    }

    fn prepare(
        &self,
        version: &AppVersion,
        fetched: &FetchedPackage,
    ) -> Result<HandOff, InstallError> {
        let attempt_id = self.attempt_id.to_string();
        info!(attempt_id = %attempt_id, version = %version, "Preparing install hand-off");

        self.markers
            .write_expected(version)
            .map_err(|e| InstallError::Io(std::io::Error::other(e)))?;

        let helper = fetched.dir.join(helper_file_name());
        std::fs::copy(&self.helper_source, &helper)?;

        let plan = InstallPlan {
            attempt_id,
            parent_pid: self.parent_pid,
            install_path: self.install_path.clone(),
            package_path: fetched.path.clone(),
            work_dir: fetched.dir.clone(),
            version: version.clone(),
            expected_size: fetched.size,
            relaunch_args: self.relaunch_args.clone(),
            marker_dir: self.markers.dir().to_path_buf(),
            parent_timeout_ms: duration_ms(self.parent_timeout),
            poll_interval_ms: duration_ms(self.poll_interval),
            copy_policy: self.copy_policy,
            reboot_fallback: self.reboot_fallback,
        };
        plan.validate()?;

        let plan_path = fetched.dir.join(INSTALL_PLAN_FILE);
        plan.save(&plan_path)?;

        Ok(HandOff {
            helper,
            plan_path,
            plan,
        })
    }

    /// Start the helper. On success the caller must exit with the returned outcome.
    pub fn launch(
        &mut self,
        handoff: &HandOff,
        launcher: &dyn Launcher,
    ) -> Result<Outcome, InstallError> {
        let next = self.state.advance(InstallState::ExternalRoutineLaunched)?;

        match launcher.spawn(&handoff.helper, &handoff.helper_args()) {
            Ok(pid) => {
                self.state = next;
                info!(
                    attempt_id = %handoff.plan.attempt_id,
                    helper_pid = pid,
                    "Install routine launched; exiting"
                );
                Ok(Outcome::Exit(0))
            }
            Err(e) => {
                self.state = self.state.advance(InstallState::Failed)?;
                self.markers.clear(crate::markers::MarkerKind::Expected);
                Err(InstallError::Spawn(e))
            }
        }
    }
}

fn helper_file_name() -> String {
    format!("lifeline-installer{}", std::env::consts::EXE_SUFFIX)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
