//! lifeline CLI entry point
//!
//! Parses arguments, runs the command, and acts on the [`Outcome`] it returns:
//! process restarts and exits happen here and nowhere else.

use clap::Parser;
use lifeline::cli;
use lifeline::core::{Outcome, user_friendly_error};
use lifeline::gate;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(Outcome::Continue) => {}
        Ok(Outcome::Exit(code)) => std::process::exit(code),
        Ok(Outcome::Restart(request)) => {
            // Only returns when the restart could not be started.
            let error = gate::restart_process(&request);
            let error_ctx = user_friendly_error(
                anyhow::Error::new(error).context("Failed to restart after a version change"),
            );
            error_ctx.display();
            std::process::exit(1);
        }
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
