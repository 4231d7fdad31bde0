//! The external install routine.
//!
//! Runs in the staged helper process (`lifeline apply-update --plan <file>`)
//! after the application has handed off. Its only inputs are the plan file and
//! the filesystem; its only output is the status markers. The sequence:
//!
//! 1. Wait for the parent process to exit. Timeout: relaunch the unchanged
//!    executable, write the error marker, stop.
//! 2. Back up the executable to `<exe>.bak` with retries. Failure: as in 1.
//! 3. Copy the package over the executable with retries and verify its size.
//!    Failure: restore from the backup first, then as in 1. When every attempt
//!    was refused with access denied and the fallback is enabled, the
//!    replacement is deferred to the next boot instead.
//! 4. Success: write the success marker, re-point autostart if it is enabled,
//!    launch the new executable, delete the backup and the download directory.
//!
//! Every path ends with exactly one launchable executable at the install path.
//! On failure the package is kept and recorded in the pending marker so the
//! next startup can offer the reboot-deferred retry.

use super::backup::{BackupManager, FileOps};
use super::orchestrator::{InstallPlan, InstallState};
use super::process::{Launcher, ProcessProbe, wait_for_exit};
use super::reboot::{RebootScheduler, schedule_pending};
use crate::autostart::AutostartRegistrar;
use crate::core::InstallError;
use crate::markers::{ErrorMarker, MarkerStore};
use std::ffi::OsString;
use std::path::Path;
use tracing::{error, info, warn};

/// Final result of the routine.
#[derive(Debug)]
pub enum RoutineOutcome {
    /// The new executable is installed and running.
    Succeeded,
    /// The swap was aborted; the previous executable was relaunched.
    Failed(InstallError),
    /// The swap was deferred to the next boot.
    AwaitingReboot,
}

impl RoutineOutcome {
    /// The terminal install state this outcome corresponds to.
    pub fn state(&self) -> InstallState {
        match self {
            Self::Succeeded => InstallState::Succeeded,
            Self::Failed(_) => InstallState::Failed,
            Self::AwaitingReboot => InstallState::AwaitingReboot,
        }
    }
}

/// Collaborators of the routine. Production code uses the platform
/// implementations; tests substitute fakes.
pub struct RoutineDeps<'a> {
    /// Parent liveness.
    pub probe: &'a dyn ProcessProbe,
    /// File copies.
    pub files: &'a dyn FileOps,
    /// Relaunching the application.
    pub launcher: &'a dyn Launcher,
    /// Reboot-deferred replacement.
    pub reboot: &'a dyn RebootScheduler,
    /// Autostart registration, when available on this platform.
    pub autostart: Option<&'a AutostartRegistrar>,
}

/// One execution of an install plan.
pub struct InstallRoutine<'a> {
    plan: InstallPlan,
    markers: MarkerStore,
    deps: RoutineDeps<'a>,
}

impl<'a> InstallRoutine<'a> {
    /// Routine for `plan`.
    pub fn new(plan: InstallPlan, deps: RoutineDeps<'a>) -> Self {
        let markers = MarkerStore::new(&plan.marker_dir);
        Self {
            plan,
            markers,
            deps,
        }
    }

    /// Execute steps 1 to 4 and report the outcome.
    pub fn run(self) -> RoutineOutcome {
        let plan = &self.plan;
        info!(
            attempt_id = %plan.attempt_id,
            version = %plan.version,
            install_path = %plan.install_path.display(),
            "Install routine started"
        );

        if let Err(e) = wait_for_exit(
            self.deps.probe,
            plan.parent_pid,
            plan.parent_timeout(),
            plan.poll_interval(),
        ) {
            return self.abort(e);
        }

        let backup = BackupManager::new(
            plan.install_path.clone(),
            self.deps.files,
            plan.copy_policy,
        );
        if let Err(e) = backup.create_backup() {
            return self.abort(e);
        }

        if let Err(e) = backup.replace_with(&plan.package_path, plan.expected_size) {
            error!(error = %e, "Replacement failed, rolling back");
            if let Err(restore) = backup.restore_backup() {
                error!(error = %restore, "Restore from backup failed");
                return self.abort(restore);
            }
            backup.cleanup_backup();

            if plan.reboot_fallback && e.is_permission_denied() {
                match schedule_pending(
                    self.deps.reboot,
                    &self.markers,
                    &plan.package_path,
                    &plan.install_path,
                ) {
                    Ok(()) => {
                        self.relaunch();
                        return RoutineOutcome::AwaitingReboot;
                    }
                    Err(reboot) => warn!(error = %reboot, "Reboot fallback unavailable"),
                }
            }
            return self.abort(e);
        }

        self.complete(&backup)
    }

    fn complete(self, backup: &BackupManager<'_>) -> RoutineOutcome {
        let plan = &self.plan;
        if let Err(e) = self.markers.write_success(&plan.version) {
            warn!(error = %e, "Failed to record success marker");
        }

        if let Some(registrar) = self.deps.autostart {
            match registrar.is_enabled() {
                Ok(true) => {
                    if let Err(e) = registrar.register_executable(&plan.install_path) {
                        warn!(error = %e, "Failed to update autostart entry");
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Cannot read autostart entry"),
            }
        }

        self.relaunch();
        backup.cleanup_backup();
        remove_work_dir(&plan.work_dir);

        info!(attempt_id = %plan.attempt_id, version = %plan.version, "Update installed");
        RoutineOutcome::Succeeded
    }

    fn abort(self, e: InstallError) -> RoutineOutcome {
        error!(attempt_id = %self.plan.attempt_id, code = e.code(), error = %e, "Install aborted");

        if let Err(marker) = self
            .markers
            .write_error(&ErrorMarker::new(e.code(), format!("{e:#}")))
        {
            error!(error = %marker, "Failed to record error marker");
        }
        if self.plan.package_path.is_file()
            && let Err(marker) = self.markers.write_pending(&self.plan.package_path)
        {
            warn!(error = %marker, "Failed to record pending package");
        }

        self.relaunch();
        RoutineOutcome::Failed(e)
    }

    fn relaunch(&self) {
        let args: Vec<OsString> = self.plan.relaunch_args.iter().map(OsString::from).collect();
        if let Err(e) = self.deps.launcher.spawn(&self.plan.install_path, &args) {
            error!(error = %e, path = %self.plan.install_path.display(), "Failed to relaunch application");
        }
    }
}

/// Best-effort removal of the download directory. The running helper lives in
/// it, so on Windows the helper itself stays behind until temp cleanup.
fn remove_work_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!(path = %dir.display(), error = %e, "Could not fully remove download directory");
    }
}
