//! XDG autostart desktop entries (`~/.config/autostart/<name>.desktop`).

use super::{Invocation, LaunchRegistry, io_error};
use crate::core::RegistrationError;
use crate::utils::fs::atomic_write;
use std::path::PathBuf;

/// Desktop-entry backend.
#[derive(Debug, Clone)]
pub struct XdgAutostartRegistry {
    dir: PathBuf,
}

impl XdgAutostartRegistry {
    /// Backend writing entries into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.desktop"))
    }
}

impl LaunchRegistry for XdgAutostartRegistry {
    fn read(&self, name: &str) -> Result<Option<Invocation>, RegistrationError> {
        let content = match std::fs::read_to_string(self.entry_path(name)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", name, e)),
        };

        let mut exec = None;
        for line in content.lines().map(str::trim) {
            if line == "Hidden=true" || line == "X-GNOME-Autostart-enabled=false" {
                return Ok(None);
            }
            if let Some(value) = line.strip_prefix("Exec=") {
                exec = Some(value);
            }
        }

        Ok(exec.and_then(parse_exec))
    }

    fn write(&self, name: &str, invocation: &Invocation) -> Result<(), RegistrationError> {
        let content = format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name={name}\n\
             Exec={}\n\
             Terminal=false\n\
             X-GNOME-Autostart-enabled=true\n",
            exec_line(invocation)
        );
        atomic_write(&self.entry_path(name), content.as_bytes())
            .map_err(|e| io_error("write", name, std::io::Error::other(e)))
    }

    fn remove(&self, name: &str) -> Result<(), RegistrationError> {
        match std::fs::remove_file(self.entry_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", name, e)),
        }
    }
}

/// Quote one Exec argument following the freedesktop Desktop Entry rules.
fn quote_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(', ')', '`',
    ];
    if !arg.is_empty() && !arg.contains(RESERVED) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn exec_line(invocation: &Invocation) -> String {
    std::iter::once(invocation.program.to_string_lossy().into_owned())
        .chain(invocation.args.iter().cloned())
        .map(|a| quote_arg(&a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_exec(line: &str) -> Option<Invocation> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => current.extend(chars.next()),
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
    let program = parts.next()?;
    Some(Invocation {
        program: PathBuf::from(program),
        args: parts.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exec_roundtrip_with_spaces() {
        let invocation = Invocation {
            program: PathBuf::from("/home/user/My Apps/life$line"),
            args: vec!["--tray".into()],
        };
        let line = exec_line(&invocation);
        assert_eq!(line, r#""/home/user/My Apps/life\$line" --tray"#);
        assert_eq!(parse_exec(&line), Some(invocation));
    }

    #[test]
    fn test_hidden_entry_reads_as_disabled() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("lifeline.desktop"),
            "[Desktop Entry]\nExec=/usr/bin/lifeline\nHidden=true\n",
        )
        .unwrap();

        let registry = XdgAutostartRegistry::new(temp.path());
        assert!(registry.read("lifeline").unwrap().is_none());
    }

    #[test]
    fn test_written_entry_is_valid_desktop_file() {
        let temp = TempDir::new().unwrap();
        let registry = XdgAutostartRegistry::new(temp.path().join("autostart"));
        registry
            .write("lifeline", &Invocation::executable("/usr/bin/lifeline"))
            .unwrap();

        let content = std::fs::read_to_string(temp.path().join("autostart/lifeline.desktop")).unwrap();
        assert!(content.starts_with("[Desktop Entry]\n"));
        assert!(content.contains("Exec=/usr/bin/lifeline\n"));
        assert!(content.contains("Type=Application\n"));
    }
}
