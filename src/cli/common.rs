//! Helpers shared by the CLI commands.

use anyhow::Result;
use colored::Colorize;
use std::io::{self, IsTerminal, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Ask a yes/no question on the terminal. An empty answer means yes.
///
/// Returns `Ok(false)` without asking when stdin is not a terminal, after
/// printing `hint` so scripted callers know which flag to pass.
pub async fn confirm(question: &str, hint: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        eprintln!("{}", hint.yellow());
        return Ok(false);
    }

    print!("{} ", format!("{question} [Y/n]:").green());
    io::stdout().flush()?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
}
