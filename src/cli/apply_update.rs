use crate::autostart::AutostartRegistrar;
use crate::constants::INSTALLER_LOG_FILE;
use crate::core::Outcome;
use crate::logging;
use crate::markers::{ErrorMarker, MarkerStore};
use crate::upgrade::backup::StdFileOps;
use crate::upgrade::process::{BackgroundLauncher, SystemProbe};
use crate::upgrade::reboot::PlatformReboot;
use crate::upgrade::{InstallPlan, InstallRoutine, RoutineDeps, RoutineOutcome};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Arguments of the hidden `lifeline apply-update`.
#[derive(Args, Debug)]
pub struct ApplyUpdateArgs {
    /// Install plan written by the orchestrator.
    #[arg(long, value_name = "FILE")]
    pub plan: PathBuf,
}

pub async fn execute(args: ApplyUpdateArgs) -> Result<Outcome> {
    let plan = InstallPlan::load(&args.plan);
    let markers = match &plan {
        Ok(plan) => MarkerStore::new(&plan.marker_dir),
        Err(_) => MarkerStore::default_location(),
    };

    let log_path = markers.dir().join(INSTALLER_LOG_FILE);
    if let Err(e) = logging::init_file(&log_path) {
        // No console to report to; carry on without a log.
        eprintln!("{e:#}");
    }

    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => {
            error!(plan = %args.plan.display(), error = %e, "Cannot read install plan");
            if let Err(marker) = markers.write_error(&ErrorMarker::new(e.code(), e.to_string())) {
                error!(error = %marker, "Failed to record error marker");
            }
            return Err(e).context("Invalid install plan");
        }
    };

    let outcome = tokio::task::spawn_blocking(move || {
        let autostart = match AutostartRegistrar::platform() {
            Ok(registrar) => Some(registrar),
            Err(e) => {
                warn!(error = %e, "Autostart registry unavailable");
                None
            }
        };
        let deps = RoutineDeps {
            probe: &SystemProbe,
            files: &StdFileOps,
            launcher: &BackgroundLauncher,
            reboot: &PlatformReboot,
            autostart: autostart.as_ref(),
        };
        InstallRoutine::new(plan, deps).run()
    })
    .await
    .context("Install routine panicked")?;

    info!(state = %outcome.state(), "Install routine finished");
    Ok(Outcome::Exit(match outcome {
        RoutineOutcome::Succeeded | RoutineOutcome::AwaitingReboot => 0,
        RoutineOutcome::Failed(_) => 1,
    }))
}
