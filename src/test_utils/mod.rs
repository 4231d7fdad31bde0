//! Test utilities for lifeline
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite.
//!
//! - [`init_test_logging`] - one-time tracing setup honouring `RUST_LOG`
//! - [`ReleaseServer`] - a loopback HTTP server answering with scripted
//!   responses, standing in for the release endpoint and asset downloads
//!
//! # Example
//!
//! ```rust,no_run
//! use lifeline::test_utils::{ReleaseServer, ScriptedResponse, release_json};
//!
//! # async fn example() {
//! let server = ReleaseServer::start(vec![ScriptedResponse::status(503)]).await;
//! let package_url = server.url("/download/lifeline-linux");
//! server.route("/latest", vec![ScriptedResponse::json(
//!     200,
//!     &release_json("v2.0.0", "Bug fixes", &[("lifeline-linux", &package_url)]),
//! )]);
//! server.route("/download/lifeline-linux", vec![ScriptedResponse::bytes(b"binary".to_vec())]);
//! # }
//! ```

mod release_server;

pub use release_server::{ReleaseServer, ScriptedResponse, release_json};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; does nothing when neither is set.
///
/// ```bash
/// RUST_LOG=lifeline=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
