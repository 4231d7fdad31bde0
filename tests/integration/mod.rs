//! Integration test suite for lifeline
//!
//! End-to-end tests that run the real binary or drive the whole update
//! pipeline against a loopback release server.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: Command behavior through the compiled binary
//! - **guard**: Single-instance lock across real processes
//! - **update_flow**: Check, fetch, hand-off, install and reconcile in sequence
//!
//! Every test isolates its state through `LIFELINE_CONFIG_PATH`,
//! `LIFELINE_MARKER_DIR`, `LIFELINE_AUTOSTART_DIR` and `LIFELINE_LOCK_PORT`;
//! nothing touches the real user configuration.

mod common;

mod cli;
mod guard;
mod update_flow;
