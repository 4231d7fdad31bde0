use crate::core::Outcome;
use crate::markers::MarkerStore;
use crate::upgrade::reboot::{PlatformReboot, schedule_pending};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Arguments of `lifeline schedule-reboot`.
#[derive(Args, Debug)]
pub struct ScheduleRebootArgs {
    /// Downloaded package that replaces the executable.
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,
}

pub fn execute(args: ScheduleRebootArgs) -> Result<Outcome> {
    let package = args
        .package
        .canonicalize()
        .with_context(|| format!("Package not found: {}", args.package.display()))?;
    let install_path = std::env::current_exe().context("Failed to get current executable path")?;

    schedule_pending(
        &PlatformReboot,
        &MarkerStore::default_location(),
        &package,
        &install_path,
    )
    .context("Failed to schedule the replacement")?;

    println!(
        "{}",
        "The update will be installed on the next restart.".green()
    );
    Ok(Outcome::Continue)
}
