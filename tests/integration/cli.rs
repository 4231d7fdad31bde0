//! Binary-level command tests.

use crate::common::TestEnv;
use lifeline::test_utils::{ReleaseServer, ScriptedResponse, release_json};
use predicates::prelude::*;

const SUCCESS_MARKER: &str = "lifeline_update_success.txt";
const ERROR_MARKER: &str = "lifeline_update_error.txt";

fn release_config(server: &ReleaseServer) -> String {
    format!(
        "auto_check_updates = false\n\
         last_run_version = \"{}\"\n\n\
         [update]\n\
         release_api_url = \"{}\"\n\
         asset_pattern = \"^lifeline-test$\"\n\n\
         [gate]\n\
         cache_dirs = []\n",
        env!("CARGO_PKG_VERSION"),
        server.url("/latest")
    )
}

#[test]
fn test_status_on_fresh_install() {
    let env = TestEnv::new();

    env.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("lifeline status"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")))
        .stdout(predicate::str::contains("disabled"));
}

#[test]
fn test_status_peeks_markers_without_consuming() {
    let env = TestEnv::new();
    env.write_marker(SUCCESS_MARKER, "2.0.0");

    env.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed version 2.0.0"));

    assert!(env.marker(SUCCESS_MARKER).exists());
}

#[test]
fn test_autostart_enable_status_disable() {
    let env = TestEnv::new();

    env.cmd()
        .args(["autostart", "enable"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Autostart enabled"));
    assert!(env.read_config().contains("autostart = true"));

    env.cmd()
        .args(["autostart", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("enabled"));

    env.cmd()
        .args(["autostart", "disable"])
        .assert()
        .success();
    env.cmd()
        .args(["autostart", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));

    // Disabling twice is a no-op.
    env.cmd().args(["autostart", "disable"]).assert().success();
}

#[test]
fn test_run_reports_success_marker_once() {
    let env = TestEnv::new();
    env.write_settled_config();
    env.write_marker(SUCCESS_MARKER, "2.0.0");

    env.cmd()
        .args(["run", "--once"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Updated successfully to version 2.0.0"));
    assert!(!env.marker(SUCCESS_MARKER).exists());

    env.cmd()
        .args(["run", "--once"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Updated successfully").not());
}

#[test]
fn test_run_first_start_records_version() {
    let env = TestEnv::new();
    env.write_config("auto_check_updates = false\n\n[gate]\ncache_dirs = []\n");

    env.cmd().args(["run", "--once"]).assert().success();

    assert!(
        env.read_config()
            .contains(&format!("last_run_version = \"{}\"", env!("CARGO_PKG_VERSION")))
    );
}

#[test]
fn test_run_exits_zero_when_already_running() {
    let env = TestEnv::new();
    env.write_settled_config();
    let _held = lifeline::guard::acquire_on(env.port).unwrap();

    env.cmd()
        .args(["run", "--once"])
        .assert()
        .success()
        .stderr(predicate::str::contains("already running"));
}

#[test]
fn test_apply_update_with_missing_plan_records_error() {
    let env = TestEnv::new();
    let plan = env.temp.path().join("missing-plan.json");

    env.cmd()
        .args(["apply-update", "--plan"])
        .arg(&plan)
        .assert()
        .failure();

    let marker = std::fs::read_to_string(env.marker(ERROR_MARKER)).unwrap();
    assert!(marker.starts_with("plan_error"));
    assert!(env.marker("lifeline-installer.log").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_reports_available_update_and_records_stats() {
    let env = TestEnv::new();
    let server = ReleaseServer::start(vec![]).await;
    server.route(
        "/latest",
        vec![ScriptedResponse::json(
            200,
            &release_json(
                "v99.0.0",
                "Faster startup",
                &[("lifeline-test", &server.url("/download/lifeline-test"))],
            ),
        )],
    );
    env.write_config(&release_config(&server));

    let assert = tokio::task::spawn_blocking({
        let mut cmd = env.cmd();
        move || cmd.arg("check").assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("Update available"))
        .stdout(predicate::str::contains("99.0.0"))
        .stdout(predicate::str::contains("Faster startup"));
    assert!(env.read_config().contains("total_checks = 1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_up_to_date() {
    let env = TestEnv::new();
    let server = ReleaseServer::start(vec![]).await;
    server.route(
        "/latest",
        vec![ScriptedResponse::json(
            200,
            &release_json("v0.0.1", "", &[("lifeline-test", "http://unused")]),
        )],
    );
    env.write_config(&release_config(&server));

    let assert = tokio::task::spawn_blocking({
        let mut cmd = env.cmd();
        move || cmd.arg("check").assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("latest version"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_failure_is_reported_and_counted() {
    let env = TestEnv::new();
    let server = ReleaseServer::start(vec![]).await;
    server.route("/latest", vec![ScriptedResponse::status(404)]);
    env.write_config(&release_config(&server));

    let assert = tokio::task::spawn_blocking({
        let mut cmd = env.cmd();
        move || cmd.arg("check").assert()
    })
    .await
    .unwrap();

    assert
        .failure()
        .stderr(predicate::str::contains("Failed to check for updates"));
    let config = env.read_config();
    assert!(config.contains("failed_checks = 1"));
    assert!(config.contains("not_found = 1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_without_terminal_needs_yes() {
    let env = TestEnv::new();
    let server = ReleaseServer::start(vec![]).await;
    server.route(
        "/latest",
        vec![ScriptedResponse::json(
            200,
            &release_json(
                "v99.0.0",
                "",
                &[("lifeline-test", &server.url("/download/lifeline-test"))],
            ),
        )],
    );
    env.write_config(&release_config(&server));

    let assert = tokio::task::spawn_blocking({
        let mut cmd = env.cmd();
        move || cmd.arg("upgrade").write_stdin("").assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stderr(predicate::str::contains("--yes"));
    assert_eq!(server.requests_for("/download/lifeline-test"), 0);
    assert!(!env.marker("lifeline_update_expected.txt").exists());
}
