use super::CliConfig;
use super::common::confirm;
use crate::app::check_and_record;
use crate::core::{GuardError, Outcome};
use crate::guard;
use crate::markers::MarkerStore;
use crate::upgrade::process::BackgroundLauncher;
use crate::upgrade::{CheckOutcome, FetchedPackage, InstallOrchestrator, PackageFetcher};
use crate::utils::DownloadProgress;
use crate::version::AppVersion;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

/// Arguments of `lifeline upgrade`.
///
/// ```bash
/// lifeline upgrade          # Ask before downloading
/// lifeline upgrade --yes    # Unattended
/// ```
#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Install without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn execute(args: UpgradeArgs, config: &CliConfig) -> Result<Outcome> {
    // Only one process may hand an update to the installer.
    let _lock = guard::acquire().map_err(|e| match e {
        GuardError::AlreadyRunning { .. } => anyhow::Error::new(e)
            .context("Close the running lifeline instance before upgrading"),
        other => anyhow::Error::new(other),
    })?;

    let attempt_id = Uuid::new_v4();
    let span = info_span!("upgrade", attempt_id = %attempt_id);
    perform_upgrade(args, config, attempt_id).instrument(span).await
}

async fn perform_upgrade(
    args: UpgradeArgs,
    config: &CliConfig,
    attempt_id: Uuid,
) -> Result<Outcome> {
    let store = config.store()?;
    let settings = store.load()?.update;
    let current = AppVersion::current();

    println!("{}", "Checking for updates...".cyan());
    let package = match check_and_record(&store, &settings, &current, attempt_id)
        .await
        .context("Failed to check for updates")?
    {
        CheckOutcome::Available(package) => package,
        CheckOutcome::NoUpdate { .. } => {
            println!(
                "{}",
                format!("Already on the latest version ({current})").green()
            );
            return Ok(Outcome::Continue);
        }
    };

    println!(
        "{}",
        format!("Update available: {current} -> {}", package.version).green()
    );
    if !package.notes.is_empty() {
        println!("\n{}\n", package.notes);
    }

    if !args.yes
        && !confirm(
            &format!("Install version {}?", package.version),
            "Not a terminal; run `lifeline upgrade --yes` to install without asking.",
        )
        .await?
    {
        println!("Upgrade cancelled");
        return Ok(Outcome::Continue);
    }

    let fetcher = PackageFetcher::new(settings.verify_policy)?;
    let progress = DownloadProgress::new(&package.version.to_string(), config.no_progress);
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let fetched = fetcher
        .fetch(&package, |percent| progress.set_percent(percent), &cancel)
        .await;
    watcher.abort();

    let fetched = match fetched {
        Ok(fetched) => {
            progress.finish_with_message("verified");
            fetched
        }
        Err(e) => {
            progress.abandon();
            return Err(e).context(format!("Failed to download version {}", package.version));
        }
    };

    hand_off(attempt_id, &package.version, &fetched)
}

fn hand_off(attempt_id: Uuid, version: &AppVersion, fetched: &FetchedPackage) -> Result<Outcome> {
    let prepared = InstallOrchestrator::for_current_exe(attempt_id, MarkerStore::default_location())
        .map(|o| o.relaunch_args(vec!["run".to_string()]))
        .and_then(|mut orchestrator| {
            let handoff = orchestrator.request(version, fetched)?;
            orchestrator.launch(&handoff, &BackgroundLauncher)
        });

    match prepared {
        Ok(outcome) => {
            println!(
                "{}",
                format!("Installing version {version}; lifeline restarts when it is done.").cyan()
            );
            Ok(outcome)
        }
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&fetched.dir) {
                warn!(path = %fetched.dir.display(), error = %cleanup, "Cannot remove download");
            }
            Err(e).context("Failed to start the installer")
        }
    }
}
