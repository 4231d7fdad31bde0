//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::net::TcpListener;
use std::path::PathBuf;
use tempfile::TempDir;

/// An isolated lifeline environment: config, markers, autostart entries and
/// lock port all private to one test.
pub struct TestEnv {
    pub temp: TempDir,
    pub port: u16,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            port: free_port(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp.path().join("config").join("config.toml")
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.temp.path().join("markers")
    }

    pub fn autostart_dir(&self) -> PathBuf {
        self.temp.path().join("autostart")
    }

    /// Write the configuration file.
    pub fn write_config(&self, content: &str) {
        let path = self.config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read_config(&self) -> String {
        std::fs::read_to_string(self.config_path()).unwrap_or_default()
    }

    /// Configuration that matches the running binary and never checks in the
    /// background.
    pub fn write_settled_config(&self) {
        self.write_config(&format!(
            "auto_check_updates = false\nlast_run_version = \"{}\"\n\n[gate]\ncache_dirs = []\n",
            env!("CARGO_PKG_VERSION")
        ));
    }

    pub fn marker(&self, name: &str) -> PathBuf {
        self.marker_dir().join(name)
    }

    pub fn write_marker(&self, name: &str, content: &str) {
        std::fs::create_dir_all(self.marker_dir()).unwrap();
        std::fs::write(self.marker(name), content).unwrap();
    }

    /// The lifeline binary with this environment applied.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("lifeline").unwrap();
        self.apply(cmd.env_remove("RUST_LOG"));
        cmd
    }

    /// The same environment on a plain `std::process::Command`.
    pub fn std_cmd(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(assert_cmd::cargo::cargo_bin("lifeline"));
        cmd.env_remove("RUST_LOG")
            .env("LIFELINE_CONFIG_PATH", self.config_path())
            .env("LIFELINE_MARKER_DIR", self.marker_dir())
            .env("LIFELINE_AUTOSTART_DIR", self.autostart_dir())
            .env("LIFELINE_LOCK_PORT", self.port.to_string())
            .env("LIFELINE_NO_PROGRESS", "1");
        cmd
    }

    fn apply(&self, cmd: &mut Command) {
        cmd.env("LIFELINE_CONFIG_PATH", self.config_path())
            .env("LIFELINE_MARKER_DIR", self.marker_dir())
            .env("LIFELINE_AUTOSTART_DIR", self.autostart_dir())
            .env("LIFELINE_LOCK_PORT", self.port.to_string())
            .env("LIFELINE_NO_PROGRESS", "1");
    }
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// Whether something currently holds `port` on the loopback interface.
pub fn port_taken(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_err()
}
