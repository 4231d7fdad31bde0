//! Progress reporting for package downloads.
//!
//! Progress bars are hidden with `--no-progress` or `LIFELINE_NO_PROGRESS`, and
//! whenever stderr is not a terminal.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use std::io::IsTerminal;

/// Environment variable that disables all progress indicators.
pub const NO_PROGRESS_ENV: &str = "LIFELINE_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some() || !std::io::stderr().is_terminal()
}

/// A percentage progress bar for the package fetcher.
#[derive(Clone)]
pub struct DownloadProgress {
    inner: IndicatifBar,
}

impl DownloadProgress {
    /// Creates a bar labelled with the version being downloaded.
    ///
    /// `hidden` forces the bar off, as `--no-progress` does.
    pub fn new(version: &str, hidden: bool) -> Self {
        let bar = if hidden || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            {
                bar.set_style(style.progress_chars("━╸━"));
            }
            bar
        };
        bar.set_prefix(format!("v{version}"));
        Self { inner: bar }
    }

    /// Moves the bar to `percent` (0-100).
    pub fn set_percent(&self, percent: u8) {
        self.inner.set_position(u64::from(percent.min(100)));
    }

    /// Finishes the bar, leaving `msg` on screen.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Removes the bar from the terminal.
    pub fn abandon(&self) {
        self.inner.finish_and_clear();
    }
}
