//! Top-level control flow signals.
//!
//! Process-replacing side effects never happen inside library code. Components
//! that need the process to restart or terminate return an [`Outcome`] and the
//! binary entry point acts on it.

use std::ffi::OsString;
use std::path::PathBuf;

/// What the entry point should do once a startup step has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Keep running the current process image.
    Continue,
    /// Replace the current process image with the given invocation.
    Restart(RestartRequest),
    /// Terminate with the given exit code.
    Exit(i32),
}

impl Outcome {
    /// Whether the caller may proceed with later startup steps.
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// The invocation a restart re-executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    /// Executable to launch.
    pub program: PathBuf,
    /// Arguments, without the program name.
    pub args: Vec<OsString>,
}

impl RestartRequest {
    /// The current executable with the current arguments.
    pub fn current() -> std::io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: std::env::args_os().skip(1).collect(),
        })
    }
}
