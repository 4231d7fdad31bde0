//! Tracing subscriber setup.
//!
//! The interactive commands log to stderr so stdout stays clean for command
//! output. The install helper has no console at all and logs to
//! `lifeline-installer.log` in the marker directory instead, where a failed
//! update can be diagnosed after the fact.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Console verbosity selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// `--quiet`: errors only.
    Quiet,
    /// Informational messages.
    #[default]
    Normal,
    /// `--verbose`: debug output.
    Verbose,
}

impl Verbosity {
    /// From the global flags. `--verbose` wins over `--quiet`.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => Self::Verbose,
            (false, true) => Self::Quiet,
            (false, false) => Self::Normal,
        }
    }

    fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Normal => LevelFilter::INFO,
            Self::Verbose => LevelFilter::DEBUG,
        }
    }
}

/// `RUST_LOG` when set, otherwise `lifeline=<level>` with dependencies at warn.
fn filter(default: LevelFilter) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(format!("lifeline={default}"))
}

/// Install the stderr subscriber. A second call is a no-op.
pub fn init_console(verbosity: Verbosity) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbosity.level()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Install a subscriber appending to `path`, for the windowless install helper.
pub fn init_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(LevelFilter::DEBUG))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install file logger: {e}"))
}
