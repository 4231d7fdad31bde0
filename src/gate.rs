//! Version gate: detect a version transition at startup and restart cleanly.
//!
//! After an installer swap or a manual upgrade the persisted "last run version"
//! differs from the version compiled into the running binary. Before any
//! network activity the gate then
//!
//! 1. removes the configured compiled-artifact cache directories (best-effort),
//! 2. persists the current version as the new last-run version, and
//! 3. returns [`Outcome::Restart`] so the entry point re-executes the binary.
//!
//! The gate never re-executes anything itself; [`restart_process`] is called by
//! `main` only.
//!
//! A re-executed image carries `LIFELINE_RESTARTED=1`. If that image still sees
//! a mismatch the gate logs it and continues instead of restarting again, and
//! it never restarts when persisting the new version failed.

use crate::config::{ConfigError, ConfigStore};
use crate::constants::RESTARTED_ENV;
use crate::core::{Outcome, RestartRequest};
use crate::version::AppVersion;
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

/// Process facts the gate needs besides the configuration.
#[derive(Debug, Clone)]
pub struct GateContext {
    /// Whether this image is itself the product of a gate restart.
    pub already_restarted: bool,
    /// Invocation used for the restart.
    pub restart: RestartRequest,
}

impl GateContext {
    /// Context of the running process.
    pub fn from_env() -> io::Result<Self> {
        Ok(Self {
            already_restarted: std::env::var_os(RESTARTED_ENV).is_some_and(|v| v == "1"),
            restart: RestartRequest::current()?,
        })
    }
}

/// Compare the persisted last-run version with `current` and decide.
///
/// Returns [`Outcome::Continue`] when the versions match, on first run, and when
/// a restart would loop or could not be made safe. Returns
/// [`Outcome::Restart`] exactly when a transition was detected and recorded.
pub fn check_and_maybe_restart(
    store: &ConfigStore,
    current: &AppVersion,
    context: &GateContext,
) -> Result<Outcome, ConfigError> {
    let config = store.load()?;

    let Some(persisted) = config.last_run_version.as_deref() else {
        info!(version = %current, "First run, recording version");
        persist(store, current);
        return Ok(Outcome::Continue);
    };

    if persisted.parse::<AppVersion>().is_ok_and(|v| &v == current) {
        debug!(version = %current, "Version unchanged");
        return Ok(Outcome::Continue);
    }

    info!(from = persisted, to = %current, "Version transition detected");
    for dir in &config.gate.cache_dirs {
        remove_cache_dir(dir);
    }

    if context.already_restarted {
        warn!(
            persisted,
            current = %current,
            "Version mismatch persists after restart; continuing"
        );
        persist(store, current);
        return Ok(Outcome::Continue);
    }

    if !persist(store, current) {
        return Ok(Outcome::Continue);
    }

    Ok(Outcome::Restart(context.restart.clone()))
}

fn persist(store: &ConfigStore, current: &AppVersion) -> bool {
    match store.modify(|config| config.last_run_version = Some(current.to_string())) {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Failed to persist last-run version; not restarting");
            false
        }
    }
}

fn remove_cache_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => info!(path = %dir.display(), "Removed compiled cache"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %dir.display(), "Compiled cache absent");
        }
        Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove compiled cache"),
    }
}

/// Replace the current process image with `request`.
///
/// On Unix this is an `exec` and only returns on failure. Elsewhere the new
/// process is spawned and the current one exits immediately.
pub fn restart_process(request: &RestartRequest) -> io::Error {
    let mut command = Command::new(&request.program);
    command.args(&request.args).env(RESTARTED_ENV, "1");
    info!(program = %request.program.display(), "Restarting");

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.exec()
    }

    #[cfg(not(unix))]
    {
        match command.spawn() {
            Ok(_) => std::process::exit(0),
            Err(e) => e,
        }
    }
}
