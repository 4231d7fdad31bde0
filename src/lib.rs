//! lifeline - process lifecycle and self-update for a per-user desktop application
//!
//! lifeline keeps exactly one instance of an application running, restarts it
//! cleanly after its binary changes, updates it from published releases, and
//! registers it to launch at login. The update path is built so the user is
//! never left without a launchable executable.
//!
//! # Architecture Overview
//!
//! ```text
//! guard ──▶ gate ──▶ reconciler ──▶ checker ──▶ fetcher ──▶ orchestrator
//!  (one      (restart    (report last    (latest      (download,     (stage helper,
//!  instance)  on version  attempt)        release)     verify)        exit)
//!             change)                                                    │
//!                                                                        ▼
//!                        next startup ◀── markers ◀── install routine (helper process)
//! ```
//!
//! The install routine runs in a separate process that outlives the
//! application. It communicates with the next startup only through the status
//! markers in [`markers`].
//!
//! # Core Modules
//!
//! - [`guard`] - Single-instance lock on a loopback port
//! - [`gate`] - Version transition detection and process restart
//! - [`upgrade`] - Check, fetch, hand-off, install routine and reconciliation
//! - [`markers`] - Crash-safe status records shared across process generations
//! - [`autostart`] - Per-user launch at login
//! - [`config`] - Configuration record with locked read-modify-write
//! - [`notify`] - The UI boundary for notices and prompts
//! - [`app`] - Startup sequence wiring the components together
//!
//! ## Supporting Modules
//! - [`cli`] - Command-line front-end
//! - [`core`] - Error types, user-facing error context, control-flow outcomes
//! - [`logging`] - Tracing subscriber setup
//! - [`version`] - Application version parsing and comparison
//! - [`utils`] - Atomic writes and progress reporting
//! - [`constants`] - Timeouts, retry parameters and well-known names

pub mod app;
pub mod autostart;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod gate;
pub mod guard;
pub mod logging;
pub mod markers;
pub mod notify;
pub mod upgrade;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
