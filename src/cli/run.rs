use super::CliConfig;
use crate::app::App;
use crate::core::Outcome;
use crate::gate::GateContext;
use crate::markers::MarkerStore;
use crate::notify::ConsoleNotifier;
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

/// Arguments of `lifeline run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Finish the startup sequence and exit instead of waiting for Ctrl-C.
    #[arg(long, hide = true)]
    pub once: bool,
}

pub async fn execute(args: RunArgs, config: &CliConfig) -> Result<Outcome> {
    let store = config.store()?;
    let context = GateContext::from_env().context("Failed to determine the current executable")?;

    let app = App::new(
        store,
        MarkerStore::default_location(),
        Arc::new(ConsoleNotifier::new()),
    );
    app.run(&context, args.once).await
}
