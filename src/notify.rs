//! User-facing notifications and prompts.
//!
//! The update core never renders anything itself. Everything the user sees goes
//! through a [`Notifier`], so a tray icon, a dialog toolkit or the terminal can
//! sit behind it. [`ConsoleNotifier`] is the terminal implementation used by the
//! binary.

use crate::markers::ErrorMarker;
use crate::upgrade::UpdatePackage;
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

/// The user's answer to a failed-update prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureChoice {
    /// Retry by replacing the executable on next boot.
    ScheduleReboot,
    /// Open the manual download page.
    OpenDownloadPage,
    /// Do nothing.
    Dismiss,
}

/// The UI boundary.
///
/// Methods may block waiting for the user; callers run them off the async
/// executor.
pub trait Notifier: Send + Sync {
    /// Show an informational message.
    fn notice(&self, message: &str);

    /// Announce an available update.
    fn update_available(&self, package: &UpdatePackage);

    /// Ask how to proceed after a failed update. `can_schedule_reboot` is false
    /// when no downloaded package is left to retry with.
    fn prompt_failure(&self, error: &ErrorMarker, can_schedule_reboot: bool) -> FailureChoice;

    /// Ask whether to finalize a pending update via the reboot fallback.
    fn prompt_finalize(&self, package: &Path) -> bool;

    /// Open `url` in the user's browser.
    fn open_url(&self, url: &str) -> io::Result<()> {
        open_in_browser(url)
    }
}

/// Terminal notifier. Prompts only when stdin is a terminal; otherwise every
/// prompt takes the no-action answer.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    interactive: bool,
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleNotifier {
    /// Notifier detecting whether prompts are possible.
    pub fn new() -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
        }
    }

    fn ask(&self, question: &str) -> Option<String> {
        if !self.interactive {
            return None;
        }
        eprint!("{} ", question.green());
        io::stderr().flush().ok()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer).ok()?;
        Some(answer.trim().to_lowercase())
    }
}

impl Notifier for ConsoleNotifier {
    fn notice(&self, message: &str) {
        eprintln!("{} {}", "lifeline:".cyan().bold(), message);
    }

    fn update_available(&self, package: &UpdatePackage) {
        eprintln!(
            "{} {}",
            "Update available:".green().bold(),
            package.version.to_string().bold()
        );
        if !package.notes.is_empty() {
            eprintln!("{}", package.notes.dimmed());
        }
        eprintln!("Run {} to install it.", "lifeline upgrade".cyan());
    }

    fn prompt_failure(&self, error: &ErrorMarker, can_schedule_reboot: bool) -> FailureChoice {
        eprintln!(
            "{} {} ({})",
            "The last update failed:".red().bold(),
            error.message,
            error.code.yellow()
        );
        if can_schedule_reboot {
            eprintln!("  [r] finish the update on next reboot");
        }
        eprintln!("  [d] open the download page");
        eprintln!("  [enter] dismiss");

        match self.ask("Choice:").as_deref() {
            Some("r") if can_schedule_reboot => FailureChoice::ScheduleReboot,
            Some("d") => FailureChoice::OpenDownloadPage,
            _ => FailureChoice::Dismiss,
        }
    }

    fn prompt_finalize(&self, package: &Path) -> bool {
        eprintln!(
            "{} {}",
            "A downloaded update is scheduled for the next restart:".yellow().bold(),
            package.display()
        );
        matches!(
            self.ask("Register it with the system again? [y/N]:").as_deref(),
            Some("y" | "yes")
        )
    }
}

/// Open `url` with the platform's default handler.
///
/// Only `http` and `https` URLs are handed over; anything else is rejected
/// without spawning a process.
pub fn open_in_browser(url: &str) -> io::Result<()> {
    open::that_detached(web_url(url)?)
}

fn web_url(url: &str) -> io::Result<&str> {
    let trimmed = url.trim();
    match trimmed.split_once("://") {
        Some((scheme, rest))
            if !rest.is_empty()
                && (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")) =>
        {
            Ok(trimmed)
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a web address: {url}"),
        )),
    }
}
