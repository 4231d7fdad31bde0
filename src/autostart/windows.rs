//! Windows `Run` registry key backend.

use super::{Invocation, LaunchRegistry, io_error};
use crate::core::RegistrationError;
use std::path::PathBuf;
use winreg::RegKey;
use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_SET_VALUE};

const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";

/// Values under `HKCU\Software\Microsoft\Windows\CurrentVersion\Run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunKeyRegistry;

impl RunKeyRegistry {
    /// The current user's `Run` key.
    pub fn current_user() -> Self {
        Self
    }
}

impl LaunchRegistry for RunKeyRegistry {
    fn read(&self, name: &str) -> Result<Option<Invocation>, RegistrationError> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let key = match hkcu.open_subkey_with_flags(RUN_KEY, KEY_READ) {
            Ok(key) => key,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", name, e)),
        };

        match key.get_value::<String, _>(name) {
            Ok(command) => Ok(Some(parse_command_line(&command))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", name, e)),
        }
    }

    fn write(&self, name: &str, invocation: &Invocation) -> Result<(), RegistrationError> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let (key, _) = hkcu
            .create_subkey(RUN_KEY)
            .map_err(|e| io_error("write", name, e))?;
        key.set_value(name, &invocation.command_line())
            .map_err(|e| io_error("write", name, e))
    }

    fn remove(&self, name: &str) -> Result<(), RegistrationError> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let key = match hkcu.open_subkey_with_flags(RUN_KEY, KEY_SET_VALUE) {
            Ok(key) => key,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error("remove", name, e)),
        };

        match key.delete_value(name) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", name, e)),
        }
    }
}

/// Split a `Run` value into program and arguments, honouring double quotes.
fn parse_command_line(command: &str) -> Invocation {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in command.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    let mut parts = parts.into_iter();
    Invocation {
        program: PathBuf::from(parts.next().unwrap_or_default()),
        args: parts.collect(),
    }
}
