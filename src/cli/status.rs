use super::CliConfig;
use crate::autostart::AutostartRegistrar;
use crate::core::Outcome;
use crate::markers::MarkerStore;
use crate::version::AppVersion;
use anyhow::Result;
use colored::Colorize;

pub fn execute(config: &CliConfig) -> Result<Outcome> {
    let store = config.store()?;
    let app_config = store.load()?;

    println!("{}", "lifeline status".bold());
    println!("  Version:           {}", AppVersion::current());
    println!(
        "  Last run version:  {}",
        app_config.last_run_version.as_deref().unwrap_or("-")
    );
    println!("  Config file:       {}", store.path().display());

    let autostart = match AutostartRegistrar::platform().and_then(|r| r.registered()) {
        Ok(Some(invocation)) => format!("{} ({})", "enabled".green(), invocation.program.display()),
        Ok(None) => "disabled".yellow().to_string(),
        Err(e) => format!("{} ({e})", "unknown".red()),
    };
    println!("  Autostart:         {autostart}");
    println!(
        "  Auto-check:        {}",
        if app_config.auto_check_updates { "on" } else { "off" }
    );

    let stats = &app_config.update_stats;
    println!("\n{}", "Update checks".bold());
    println!(
        "  Total: {}  Succeeded: {}  Failed: {}",
        stats.total_checks, stats.successful_checks, stats.failed_checks
    );
    for (category, count) in &stats.error_counts {
        println!("    {category}: {count}");
    }
    if let Some(last) = stats.last_check {
        println!("  Last check:   {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(last) = stats.last_success {
        println!("  Last success: {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    // Peek only: the next `run` must still see and consume these.
    let markers = MarkerStore::default_location().peek();
    if !markers.is_empty() {
        println!("\n{}", "Pending update state".bold());
        if let Some(version) = &markers.success {
            println!("  Installed version {version}, not yet reported");
        }
        if let Some(error) = &markers.error {
            println!("  {} {} ({})", "Failed:".red(), error.message, error.code);
        }
        if let Some(version) = &markers.expected {
            println!("  Expected version {version}");
        }
        if let Some(package) = &markers.pending {
            println!("  Package awaiting reboot: {}", package.display());
        }
    }
    Ok(Outcome::Continue)
}
