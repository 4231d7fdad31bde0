use super::CliConfig;
use crate::autostart::AutostartRegistrar;
use crate::config::ConfigStore;
use crate::core::Outcome;
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tracing::warn;

/// `lifeline autostart <action>`.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutostartAction {
    /// Launch lifeline at login.
    Enable,
    /// Stop launching lifeline at login.
    Disable,
    /// Show the live registration.
    Status,
}

pub fn execute(action: AutostartAction, config: &CliConfig) -> Result<Outcome> {
    let registrar = AutostartRegistrar::platform()?;
    let store = config.store()?;
    run_with(action, &registrar, &store)?;
    Ok(Outcome::Continue)
}

fn run_with(
    action: AutostartAction,
    registrar: &AutostartRegistrar,
    store: &ConfigStore,
) -> Result<()> {
    match action {
        AutostartAction::Enable | AutostartAction::Disable => {
            let enable = action == AutostartAction::Enable;
            registrar
                .set_enabled(enable)
                .context("Failed to update the autostart entry")?;
            // The registry is authoritative; the config only mirrors the choice.
            if let Err(e) = store.modify(|c| c.autostart = enable) {
                warn!(error = %e, "Failed to record autostart preference");
            }
            let state = if enable { "enabled" } else { "disabled" };
            println!("{}", format!("Autostart {state}").green());
        }
        AutostartAction::Status => match registrar.registered()? {
            Some(invocation) => println!(
                "Autostart: {} ({})",
                "enabled".green(),
                invocation.program.display()
            ),
            None => println!("Autostart: {}", "disabled".yellow()),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autostart::XdgAutostartRegistry;
    use tempfile::TempDir;

    #[test]
    fn test_enable_disable_mirrors_config() {
        let temp = TempDir::new().unwrap();
        let registrar = AutostartRegistrar::new(
            Box::new(XdgAutostartRegistry::new(temp.path().join("autostart"))),
            "lifeline",
        );
        let store = ConfigStore::new(temp.path().join("config.toml"));

        run_with(AutostartAction::Enable, &registrar, &store).unwrap();
        assert!(registrar.is_enabled().unwrap());
        assert!(store.load().unwrap().autostart);

        run_with(AutostartAction::Disable, &registrar, &store).unwrap();
        assert!(!registrar.is_enabled().unwrap());
        assert!(!store.load().unwrap().autostart);

        // Disabling an absent entry is not an error.
        run_with(AutostartAction::Disable, &registrar, &store).unwrap();
    }
}
