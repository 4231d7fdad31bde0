//! Self-update pipeline for lifeline.
//!
//! This module checks for new releases, downloads and verifies them, and hands
//! the binary swap to an external install routine that outlives the running
//! process. The next startup reads what the routine left behind and reports it.
//!
//! # Update Process Flow
//!
//! ```text
//! 1. Check (checker)
//!    ├── Query the latest-release endpoint, retrying transient failures
//!    └── Compare with the running version, pick the platform asset
//!
//! 2. Fetch (fetcher)
//!    ├── Stream into a fresh lifeline_update_* directory
//!    ├── Hash while writing, report progress per chunk
//!    └── Verify SHA-256; any failure deletes the directory
//!
//! 3. Hand-off (orchestrator)
//!    ├── Record the expected version marker
//!    ├── Stage a helper copy of this binary next to the package
//!    ├── Write install-plan.json
//!    └── Launch the helper without a window and exit
//!
//! 4. Install (routine, in the helper)
//!    ├── Wait for the parent to exit
//!    ├── Back up to <exe>.bak, copy the package over, verify the size
//!    ├── On failure: restore, write the error marker, relaunch the old binary
//!    └── On success: write the success marker, relaunch, clean up
//!
//! 5. Reconcile (reconciler, next startup)
//!    └── Consume the markers and tell the user what happened
//! ```
//!
//! # Safety Mechanisms
//!
//! - The install path always holds exactly one launchable executable. Every
//!   failure after the backup restores it before anything else happens.
//! - The helper never runs from the install path, so the file it replaces is
//!   never its own image.
//! - Status markers are written with write-then-rename; the helper can be
//!   killed at any point without leaving a half-written marker.
//! - When direct replacement is refused, Windows can apply the rename at next
//!   boot instead (see [`reboot`]).

/// `.bak` backup and restore around the swap, with retries.
pub mod backup;
/// Latest-release query with retry and classification.
pub mod checker;
/// Streaming download with checksum verification.
pub mod fetcher;
/// Install state machine and hand-off to the helper.
pub mod orchestrator;
/// Windowless spawning and parent-exit polling.
pub mod process;
/// Reboot-deferred replacement.
pub mod reboot;
/// Startup reconciliation of the previous attempt.
pub mod reconciler;
/// Release metadata and asset selection.
pub mod release;
/// The install routine executed by the helper.
pub mod routine;
/// SHA-256 digests and verification.
pub mod verification;


pub use checker::{CheckOutcome, UpdateChecker};
pub use fetcher::{FetchedPackage, PackageFetcher};
pub use orchestrator::{HandOff, InstallOrchestrator, InstallPlan, InstallState};
pub use reconciler::{OutcomeReconciler, Reconciliation, Resolution, reconcile};
pub use release::{AssetMatcher, UpdatePackage};
pub use routine::{InstallRoutine, RoutineDeps, RoutineOutcome};
pub use verification::{ChecksumVerifier, Sha256Digest};
