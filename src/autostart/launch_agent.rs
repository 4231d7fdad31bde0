//! macOS LaunchAgent property lists (`~/Library/LaunchAgents/<label>.plist`).

use super::{Invocation, LaunchRegistry, io_error};
use crate::core::RegistrationError;
use crate::utils::fs::atomic_write;
use std::path::PathBuf;

/// LaunchAgent backend. The entry name is used as the agent label.
#[derive(Debug, Clone)]
pub struct LaunchAgentRegistry {
    dir: PathBuf,
}

impl LaunchAgentRegistry {
    /// Backend writing property lists into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn plist_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{label}.plist"))
    }
}

impl LaunchRegistry for LaunchAgentRegistry {
    fn read(&self, name: &str) -> Result<Option<Invocation>, RegistrationError> {
        let content = match std::fs::read_to_string(self.plist_path(name)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", name, e)),
        };
        Ok(parse_program_arguments(&content))
    }

    fn write(&self, name: &str, invocation: &Invocation) -> Result<(), RegistrationError> {
        let arguments: String = std::iter::once(invocation.program.to_string_lossy().into_owned())
            .chain(invocation.args.iter().cloned())
            .map(|arg| format!("        <string>{}</string>\n", escape(&arg)))
            .collect();

        let content = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
{arguments}    </array>
    <key>RunAtLoad</key>
    <true/>
</dict>
</plist>
"#,
            label = escape(name),
        );

        atomic_write(&self.plist_path(name), content.as_bytes())
            .map_err(|e| io_error("write", name, std::io::Error::other(e)))
    }

    fn remove(&self, name: &str) -> Result<(), RegistrationError> {
        match std::fs::remove_file(self.plist_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", name, e)),
        }
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// Extract the `ProgramArguments` array from a property list we wrote.
fn parse_program_arguments(content: &str) -> Option<Invocation> {
    let start = content.find("<key>ProgramArguments</key>")?;
    let rest = &content[start..];
    let array = &rest[rest.find("<array>")?..rest.find("</array>")?];

    let mut values = array.split("<string>").skip(1).filter_map(|chunk| {
        chunk
            .split_once("</string>")
            .map(|(value, _)| unescape(value))
    });

    let program = values.next()?;
    Some(Invocation {
        program: PathBuf::from(program),
        args: values.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let registry = LaunchAgentRegistry::new(temp.path());
        let invocation = Invocation {
            program: PathBuf::from("/Applications/Life & Line.app/Contents/MacOS/lifeline"),
            args: vec!["--background".into()],
        };

        registry.write("io.lifeline.app", &invocation).unwrap();
        assert_eq!(registry.read("io.lifeline.app").unwrap(), Some(invocation));

        let content = std::fs::read_to_string(temp.path().join("io.lifeline.app.plist")).unwrap();
        assert!(content.contains("<key>RunAtLoad</key>"));
        assert!(content.contains("Life &amp; Line.app"));
    }

    #[test]
    fn test_remove_absent_is_ok() {
        let temp = TempDir::new().unwrap();
        let registry = LaunchAgentRegistry::new(temp.path());
        registry.remove("io.lifeline.app").unwrap();
        assert!(registry.read("io.lifeline.app").unwrap().is_none());
    }
}
