//! Background process spawning and parent-liveness polling.
//!
//! The install helper and every relaunch must start without a visible window.
//! On Windows that means `CREATE_NO_WINDOW`, and never together with
//! `DETACHED_PROCESS`: the two are mutually exclusive and the combination makes
//! Windows allocate a console that flashes on screen. On Unix the child gets its
//! own process group and null stdio so it survives the parent's exit and
//! terminal hang-ups.
//!
//! Background children never inherit the gate's restart flag: a relaunched
//! binary must run its own version gate from scratch.

use crate::constants::RESTARTED_ENV;
use crate::core::InstallError;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, info};

/// Win32 `CREATE_NO_WINDOW`.
pub const CREATE_NO_WINDOW: u32 = 0x0800_0000;
/// Win32 `CREATE_NEW_PROCESS_GROUP`.
pub const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
/// Win32 `DETACHED_PROCESS`. Never combined with [`CREATE_NO_WINDOW`].
pub const DETACHED_PROCESS: u32 = 0x0000_0008;

/// Creation flags for every background process on Windows.
pub const BACKGROUND_CREATION_FLAGS: u32 = CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP;

/// Answers whether a process id is still running.
pub trait ProcessProbe: Send + Sync {
    /// Whether `pid` refers to a live process.
    fn is_alive(&self, pid: u32) -> bool;
}

/// [`ProcessProbe`] backed by the OS process table. Zombies count as exited.
#[derive(Debug, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system
            .process(pid)
            .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }
}

/// Poll until `pid` has exited, or fail after `timeout`.
pub fn wait_for_exit(
    probe: &dyn ProcessProbe,
    pid: u32,
    timeout: Duration,
    interval: Duration,
) -> Result<(), InstallError> {
    let started = Instant::now();
    loop {
        if !probe.is_alive(pid) {
            debug!(pid, waited_ms = started.elapsed().as_millis() as u64, "Parent exited");
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(InstallError::LockTimeout {
                pid,
                waited: timeout,
            });
        }
        std::thread::sleep(interval);
    }
}

/// Starts programs in the background.
pub trait Launcher: Send + Sync {
    /// Spawn `program` with `args` and return its pid without waiting.
    fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<u32>;
}

/// [`Launcher`] that creates a windowless, independent process.
#[derive(Debug, Default)]
pub struct BackgroundLauncher;

impl Launcher for BackgroundLauncher {
    fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<u32> {
        let mut command = Command::new(program);
        command.args(args);
        configure_background(&mut command);

        let child = command.spawn()?;
        info!(program = %program.display(), pid = child.id(), "Launched background process");
        Ok(child.id())
    }
}

/// Apply windowless, independent-process settings to `command`.
pub fn configure_background(command: &mut Command) {
    command
        .env_remove(RESTARTED_ENV)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(BACKGROUND_CREATION_FLAGS);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
}
