//! The full update pipeline in one process, against a loopback release server.
//!
//! The helper process is replaced by running the install routine directly with
//! the plan the orchestrator wrote; everything else is the production code.

use lifeline::config::VerifyPolicy;
use lifeline::core::{FetchError, InstallError, Outcome};
use lifeline::markers::{ErrorMarker, MarkerStore};
use lifeline::notify::{FailureChoice, Notifier};
use lifeline::test_utils::{ReleaseServer, ScriptedResponse, init_test_logging, release_json};
use lifeline::upgrade::backup::StdFileOps;
use lifeline::upgrade::process::{Launcher, ProcessProbe};
use lifeline::upgrade::reboot::RebootScheduler;
use lifeline::upgrade::{
    AssetMatcher, CheckOutcome, InstallOrchestrator, InstallPlan, InstallRoutine,
    OutcomeReconciler, PackageFetcher, Reconciliation, Resolution, RoutineDeps, RoutineOutcome,
    Sha256Digest, UpdateChecker, UpdatePackage, reconcile,
};
use lifeline::version::AppVersion;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const NEW_BINARY: &[u8] = b"#!/bin/sh\necho lifeline 2.0.0\n";

struct ParentGone;

impl ProcessProbe for ParentGone {
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }
}

#[derive(Default)]
struct RecordingLauncher {
    launched: Mutex<Vec<(PathBuf, Vec<OsString>)>>,
}

impl Launcher for RecordingLauncher {
    fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<u32> {
        self.launched
            .lock()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));
        Ok(4242)
    }
}

struct NoReboot;

impl RebootScheduler for NoReboot {
    fn schedule(&self, _source: &Path, _target: &Path) -> Result<(), InstallError> {
        Err(InstallError::RebootUnsupported)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }

    fn update_available(&self, _package: &UpdatePackage) {}

    fn prompt_failure(&self, _error: &ErrorMarker, _can: bool) -> FailureChoice {
        FailureChoice::Dismiss
    }

    fn prompt_finalize(&self, _package: &Path) -> bool {
        false
    }
}

async fn release_server(notes: &str) -> ReleaseServer {
    let server = ReleaseServer::start(vec![]).await;
    let download = server.url("/download/lifeline-e2e");
    server.route(
        "/latest",
        vec![
            // One transient failure before the real answer.
            ScriptedResponse::status(503),
            ScriptedResponse::json(
                200,
                &release_json("v2.0.0", notes, &[("lifeline-e2e", &download)]),
            ),
        ],
    );
    server.route(
        "/download/lifeline-e2e",
        vec![ScriptedResponse::bytes(NEW_BINARY.to_vec())],
    );
    server
}

#[tokio::test]
async fn test_check_fetch_install_reconcile() {
    init_test_logging(None);
    let temp = TempDir::new().unwrap();
    let install_path = temp.path().join("app").join("lifeline");
    std::fs::create_dir_all(install_path.parent().unwrap()).unwrap();
    std::fs::write(&install_path, b"lifeline 1.0.0").unwrap();
    let markers = MarkerStore::new(temp.path().join("markers"));

    let checksum = Sha256Digest::of(NEW_BINARY);
    let server = release_server(&format!("Bug fixes\n\nSHA256: {checksum}")).await;

    // Check
    let checker = UpdateChecker::new(
        server.url("/latest"),
        AssetMatcher::new("^lifeline-e2e$").unwrap(),
    )
    .unwrap()
    .with_initial_backoff(Duration::from_millis(10));
    let package = match checker.check(&AppVersion::new(1, 0, 0)).await.unwrap() {
        CheckOutcome::Available(package) => package,
        other => panic!("expected an update, got {other:?}"),
    };
    assert_eq!(package.version, AppVersion::new(2, 0, 0));
    assert_eq!(package.checksum, Some(checksum));

    // Fetch
    let fetched = PackageFetcher::new(VerifyPolicy::RequireChecksum)
        .unwrap()
        .with_download_root(temp.path().join("downloads"))
        .fetch(&package, |_| {}, &CancellationToken::new())
        .await
        .unwrap();
    assert!(fetched.verified);
    assert_eq!(std::fs::read(&fetched.path).unwrap(), NEW_BINARY);

    // Hand-off
    let launcher = RecordingLauncher::default();
    let mut orchestrator = InstallOrchestrator::new(
        Uuid::new_v4(),
        markers.clone(),
        install_path.clone(),
        install_path.clone(),
    )
    .parent_timing(Duration::from_millis(100), Duration::from_millis(10));
    let handoff = orchestrator.request(&package.version, &fetched).unwrap();
    assert_eq!(
        orchestrator.launch(&handoff, &launcher).unwrap(),
        Outcome::Exit(0)
    );

    // Install, as the helper would after the parent exits
    let plan = InstallPlan::load(&handoff.plan_path).unwrap();
    let relauncher = RecordingLauncher::default();
    let outcome = InstallRoutine::new(
        plan,
        RoutineDeps {
            probe: &ParentGone,
            files: &StdFileOps,
            launcher: &relauncher,
            reboot: &NoReboot,
            autostart: None,
        },
    )
    .run();
    assert!(matches!(outcome, RoutineOutcome::Succeeded));
    assert_eq!(std::fs::read(&install_path).unwrap(), NEW_BINARY);
    assert!(!fetched.dir.exists());
    assert_eq!(relauncher.launched.lock().unwrap()[0].0, install_path);

    // Next startup
    let reconciliation = reconcile(&markers, &AppVersion::new(2, 0, 0));
    assert_eq!(
        reconciliation,
        Reconciliation::Succeeded {
            version: AppVersion::new(2, 0, 0),
            expected: Some(AppVersion::new(2, 0, 0)),
        }
    );

    let notifier = Arc::new(RecordingNotifier::default());
    let reconciler = OutcomeReconciler::new(
        markers.clone(),
        notifier.clone(),
        Arc::new(NoReboot),
        install_path,
        "https://example.invalid/releases",
    )
    .with_success_delay(Duration::ZERO);
    assert_eq!(reconciler.surface(reconciliation).await, Resolution::Notified);
    assert!(notifier.notices.lock().unwrap()[0].contains("2.0.0"));

    let left = markers.peek();
    assert!(left.error.is_none());
    assert!(left.is_empty());
}

#[tokio::test]
async fn test_checksum_mismatch_never_reaches_installer() {
    let temp = TempDir::new().unwrap();
    let wrong = Sha256Digest::of(b"something else");
    let server = release_server(&format!("sha256: {wrong}")).await;

    let checker = UpdateChecker::new(
        server.url("/latest"),
        AssetMatcher::new("^lifeline-e2e$").unwrap(),
    )
    .unwrap()
    .with_initial_backoff(Duration::from_millis(10));
    let CheckOutcome::Available(package) = checker.check(&AppVersion::new(1, 0, 0)).await.unwrap()
    else {
        panic!("expected an update");
    };

    let downloads = temp.path().join("downloads");
    let err = PackageFetcher::new(VerifyPolicy::Permissive)
        .unwrap()
        .with_download_root(&downloads)
        .fetch(&package, |_| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
    let leftovers = std::fs::read_dir(&downloads).unwrap().count();
    assert_eq!(leftovers, 0);
}
