//! Command-line interface for lifeline.
//!
//! # Commands
//!
//! - `run` - Start the application host (the default without a subcommand)
//! - `check` - Check once for a newer release
//! - `upgrade` - Download the latest release and hand it to the installer
//! - `autostart` - Enable, disable or inspect launch at login
//! - `status` - Show version, autostart, statistics and pending update state
//! - `schedule-reboot` - Install a downloaded package on next boot
//!
//! `apply-update` is hidden: it is the entry point of the staged install helper
//! and is never typed by a user.
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Suppress all output except errors
//! - `--config` - Use an alternate configuration file
//! - `--no-progress` - Disable the download progress bar
//!
//! # Examples
//!
//! ```bash
//! lifeline                      # Run the application host
//! lifeline check                # Is there a newer release?
//! lifeline upgrade --yes        # Upgrade without asking
//! lifeline autostart enable     # Launch at login
//! lifeline --verbose status     # Everything lifeline knows
//! ```

mod apply_update;
mod autostart;
mod check;
pub mod common;
mod run;
mod schedule_reboot;
mod status;
mod upgrade;

use crate::config::{ConfigError, ConfigStore};
use crate::core::Outcome;
use crate::logging::{self, Verbosity};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Settings derived from the global flags, handed to every command.
///
/// Commands receive this instead of reading process state so tests can build
/// one directly.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Console log verbosity.
    pub verbosity: Verbosity,

    /// Hide the download progress bar.
    pub no_progress: bool,

    /// Explicit configuration file, overriding `LIFELINE_CONFIG_PATH` and the
    /// platform default.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// The configuration store selected by the flags.
    pub fn store(&self) -> Result<ConfigStore, ConfigError> {
        ConfigStore::open(self.config_path.clone())
    }
}

/// Process-lifecycle and self-update manager.
#[derive(Parser)]
#[command(
    name = "lifeline",
    about = "Single-instance host with safe self-update, restart and autostart",
    version,
    long_about = "lifeline keeps one instance of the application running, updates it from \
                  published releases without ever leaving a broken executable behind, and \
                  manages launch at login."
)]
pub struct Cli {
    /// The subcommand to execute. Defaults to `run`.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output for debugging.
    ///
    /// Equivalent to `RUST_LOG=lifeline=debug`. An explicit `RUST_LOG` wins.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to an alternate configuration file.
    ///
    /// Defaults to `lifeline/config.toml` in the platform configuration
    /// directory, or `LIFELINE_CONFIG_PATH` when set.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable the download progress bar.
    ///
    /// Also disabled automatically when stderr is not a terminal.
    #[arg(long, global = true)]
    no_progress: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the application host.
    ///
    /// Holds the single-instance lock, restarts after a version change,
    /// reports the result of the last update and checks for new releases in
    /// the background. Stops on Ctrl-C.
    Run(run::RunArgs),

    /// Check for a newer release without installing it.
    Check,

    /// Download and install the latest release.
    ///
    /// The running process exits once the installer has taken over; the new
    /// version starts automatically when the swap is done.
    Upgrade(upgrade::UpgradeArgs),

    /// Manage launch at login.
    Autostart {
        #[command(subcommand)]
        action: autostart::AutostartAction,
    },

    /// Show version, autostart, statistics and pending update state.
    Status,

    /// Replace the executable with a downloaded package on next boot.
    ScheduleReboot(schedule_reboot::ScheduleRebootArgs),

    /// Install a prepared update. Launched by `upgrade`, not by users.
    #[command(hide = true)]
    ApplyUpdate(apply_update::ApplyUpdateArgs),
}

impl Cli {
    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        CliConfig {
            verbosity: Verbosity::from_flags(self.verbose, self.quiet),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Execute the command and report what the entry point should do next.
    pub async fn execute(self) -> Result<Outcome> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Execute with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<Outcome> {
        // The install helper has no console; it sets up file logging itself.
        if !matches!(self.command, Some(Commands::ApplyUpdate(_))) {
            logging::init_console(config.verbosity);
        }

        match self.command {
            None => run::execute(run::RunArgs::default(), &config).await,
            Some(Commands::Run(args)) => run::execute(args, &config).await,
            Some(Commands::Check) => check::execute(&config).await,
            Some(Commands::Upgrade(args)) => upgrade::execute(args, &config).await,
            Some(Commands::Autostart { action }) => autostart::execute(action, &config),
            Some(Commands::Status) => status::execute(&config),
            Some(Commands::ScheduleReboot(args)) => schedule_reboot::execute(args),
            Some(Commands::ApplyUpdate(args)) => apply_update::execute(args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["lifeline"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli =
            Cli::try_parse_from(["lifeline", "status", "--verbose", "--no-progress"]).unwrap();
        let config = cli.build_config();
        assert_eq!(config.verbosity, Verbosity::Verbose);
        assert!(config.no_progress);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["lifeline", "--verbose", "--quiet", "check"]).is_err());
    }

    #[test]
    fn test_apply_update_requires_plan() {
        assert!(Cli::try_parse_from(["lifeline", "apply-update"]).is_err());
        let cli =
            Cli::try_parse_from(["lifeline", "apply-update", "--plan", "/tmp/plan.json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::ApplyUpdate(_))));
    }

    #[test]
    fn test_upgrade_yes_flag() {
        let cli = Cli::try_parse_from(["lifeline", "upgrade", "-y"]).unwrap();
        match cli.command {
            Some(Commands::Upgrade(args)) => assert!(args.yes),
            _ => panic!("expected upgrade"),
        }
    }
}
