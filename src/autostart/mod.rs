//! Autostart registrar: the per-user "launch at login" entry.
//!
//! The OS registration is the only source of truth. [`AutostartRegistrar::is_enabled`]
//! reads it live every time, so a change made outside the application (task
//! manager, desktop settings) is reflected immediately, and
//! [`AutostartRegistrar::set_enabled`] recomputes the invocation from the running
//! executable on every call instead of caching it.
//!
//! Backends implement [`LaunchRegistry`]:
//!
//! - Windows: a value under `HKCU\Software\Microsoft\Windows\CurrentVersion\Run`
//! - macOS: a LaunchAgent property list in `~/Library/LaunchAgents`
//! - Other Unix: an XDG autostart desktop entry in `~/.config/autostart`
//!
//! `LIFELINE_AUTOSTART_DIR` redirects the file-based backends.

mod launch_agent;
#[cfg(windows)]
mod windows;
mod xdg;

pub use launch_agent::LaunchAgentRegistry;
#[cfg(windows)]
pub use windows::RunKeyRegistry;
pub use xdg::XdgAutostartRegistry;

use crate::constants::{APP_NAME, AUTOSTART_DIR_ENV};
use crate::core::RegistrationError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A full launch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
}

impl Invocation {
    /// Launch `program` with no arguments.
    pub fn executable(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable.
    pub fn current() -> Result<Self, RegistrationError> {
        std::env::current_exe()
            .map(Self::executable)
            .map_err(RegistrationError::Executable)
    }

    /// Windows command line: every component double-quoted.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|part| format!("\"{}\"", part.replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A per-user launch registry holding named entries.
pub trait LaunchRegistry: Send + Sync {
    /// Current entry value, `None` when absent.
    fn read(&self, name: &str) -> Result<Option<Invocation>, RegistrationError>;

    /// Create or overwrite the entry.
    fn write(&self, name: &str, invocation: &Invocation) -> Result<(), RegistrationError>;

    /// Remove the entry. Removing an absent entry succeeds.
    fn remove(&self, name: &str) -> Result<(), RegistrationError>;
}

/// Enables and disables the application's autostart entry.
pub struct AutostartRegistrar {
    registry: Box<dyn LaunchRegistry>,
    name: String,
}

impl AutostartRegistrar {
    /// Registrar for entry `name` in `registry`.
    pub fn new(registry: Box<dyn LaunchRegistry>, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
        }
    }

    /// Registrar for the application entry in the platform registry.
    pub fn platform() -> Result<Self, RegistrationError> {
        Ok(Self::new(platform_registry()?, APP_NAME))
    }

    /// Whether the entry currently exists in the OS registry.
    pub fn is_enabled(&self) -> Result<bool, RegistrationError> {
        Ok(self.registry.read(&self.name)?.is_some())
    }

    /// The registered invocation, if any.
    pub fn registered(&self) -> Result<Option<Invocation>, RegistrationError> {
        self.registry.read(&self.name)
    }

    /// Create the entry for the running executable, or remove it.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), RegistrationError> {
        if enabled {
            self.register(&Invocation::current()?)
        } else {
            self.registry.remove(&self.name)?;
            info!(name = %self.name, "Autostart disabled");
            Ok(())
        }
    }

    /// Point the entry at `executable`.
    ///
    /// Used by the install routine, which runs from a staged helper copy and
    /// must register the installed binary rather than itself.
    pub fn register_executable(&self, executable: &Path) -> Result<(), RegistrationError> {
        self.register(&Invocation::executable(executable))
    }

    fn register(&self, invocation: &Invocation) -> Result<(), RegistrationError> {
        debug!(name = %self.name, program = %invocation.program.display(), "Writing autostart entry");
        self.registry.write(&self.name, invocation)?;
        info!(name = %self.name, "Autostart enabled");
        Ok(())
    }
}

/// Directory override for the file-based backends.
fn override_dir() -> Option<PathBuf> {
    std::env::var_os(AUTOSTART_DIR_ENV)
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
}

/// The launch registry of the running platform.
pub fn platform_registry() -> Result<Box<dyn LaunchRegistry>, RegistrationError> {
    #[cfg(windows)]
    {
        if let Some(dir) = override_dir() {
            return Ok(Box::new(XdgAutostartRegistry::new(dir)));
        }
        Ok(Box::new(RunKeyRegistry::current_user()))
    }

    #[cfg(target_os = "macos")]
    {
        let dir = match override_dir() {
            Some(dir) => dir,
            None => dirs::home_dir()
                .ok_or(RegistrationError::Unsupported)?
                .join("Library")
                .join("LaunchAgents"),
        };
        Ok(Box::new(LaunchAgentRegistry::new(dir)))
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let dir = match override_dir() {
            Some(dir) => dir,
            None => dirs::config_dir()
                .ok_or(RegistrationError::Unsupported)?
                .join("autostart"),
        };
        Ok(Box::new(XdgAutostartRegistry::new(dir)))
    }

    #[cfg(not(any(windows, unix)))]
    {
        Err(RegistrationError::Unsupported)
    }
}

fn io_error(action: &'static str, name: &str, source: std::io::Error) -> RegistrationError {
    RegistrationError::Io {
        action,
        name: name.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registrar(temp: &TempDir) -> AutostartRegistrar {
        AutostartRegistrar::new(Box::new(XdgAutostartRegistry::new(temp.path())), "lifeline")
    }

    #[test]
    fn test_enable_disable_cycle() {
        let temp = TempDir::new().unwrap();
        let registrar = registrar(&temp);

        assert!(!registrar.is_enabled().unwrap());
        registrar.set_enabled(true).unwrap();
        assert!(registrar.is_enabled().unwrap());
        assert_eq!(
            registrar.registered().unwrap().unwrap().program,
            std::env::current_exe().unwrap()
        );

        registrar.set_enabled(false).unwrap();
        assert!(!registrar.is_enabled().unwrap());
    }

    #[test]
    fn test_disable_absent_entry_is_noop() {
        let temp = TempDir::new().unwrap();
        let registrar = registrar(&temp);
        registrar.set_enabled(false).unwrap();
        registrar.set_enabled(false).unwrap();
        assert!(!registrar.is_enabled().unwrap());
    }

    #[test]
    fn test_is_enabled_reflects_external_changes() {
        let temp = TempDir::new().unwrap();
        let registrar = registrar(&temp);
        registrar.set_enabled(true).unwrap();

        std::fs::remove_file(temp.path().join("lifeline.desktop")).unwrap();
        assert!(!registrar.is_enabled().unwrap());
    }

    #[test]
    fn test_register_executable_overwrites() {
        let temp = TempDir::new().unwrap();
        let registrar = registrar(&temp);
        registrar.set_enabled(true).unwrap();

        let installed = temp.path().join("opt dir").join("lifeline");
        registrar.register_executable(&installed).unwrap();
        assert_eq!(registrar.registered().unwrap().unwrap().program, installed);
    }

    #[test]
    fn test_command_line_quoting() {
        let invocation = Invocation {
            program: PathBuf::from(r"C:\Program Files\Lifeline\lifeline.exe"),
            args: vec!["--minimized".into()],
        };
        assert_eq!(
            invocation.command_line(),
            r#""C:\Program Files\Lifeline\lifeline.exe" "--minimized""#
        );
    }
}
