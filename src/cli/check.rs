use super::CliConfig;
use crate::app::check_and_record;
use crate::core::Outcome;
use crate::upgrade::CheckOutcome;
use crate::version::AppVersion;
use anyhow::{Context, Result};
use colored::Colorize;
use uuid::Uuid;

pub async fn execute(config: &CliConfig) -> Result<Outcome> {
    let store = config.store()?;
    let settings = store.load()?.update;
    let current = AppVersion::current();

    println!("{}", "Checking for updates...".cyan());
    let outcome = check_and_record(&store, &settings, &current, Uuid::new_v4())
        .await
        .context("Failed to check for updates")?;

    match outcome {
        CheckOutcome::Available(package) => {
            println!(
                "{}",
                format!("Update available: {current} -> {}", package.version).green()
            );
            if !package.notes.is_empty() {
                println!("\n{}\n", package.notes);
            }
            println!("Run `lifeline upgrade` to install it");
        }
        CheckOutcome::NoUpdate { latest } => {
            println!(
                "{}",
                format!("You are on the latest version ({current}, latest release {latest})")
                    .green()
            );
        }
    }
    Ok(Outcome::Continue)
}
