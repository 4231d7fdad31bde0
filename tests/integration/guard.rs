//! Single-instance lock across real processes.

use crate::common::{TestEnv, port_taken};
use predicates::prelude::*;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

fn start_host(env: &TestEnv) -> Child {
    env.std_cmd()
        .arg("run")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn test_second_instance_exits_while_first_runs() {
    let env = TestEnv::new();
    env.write_settled_config();
    let mut host = start_host(&env);
    wait_until("the host to take the lock", || port_taken(env.port));

    env.cmd()
        .args(["run", "--once"])
        .assert()
        .success()
        .stderr(predicate::str::contains("already running"));

    host.kill().unwrap();
    host.wait().unwrap();
}

#[test]
fn test_lock_released_when_holder_is_killed() {
    let env = TestEnv::new();
    env.write_settled_config();
    let mut host = start_host(&env);
    wait_until("the host to take the lock", || port_taken(env.port));

    // A crash, not a clean shutdown.
    host.kill().unwrap();
    host.wait().unwrap();

    wait_until("the lock to be released", || !port_taken(env.port));
    let lock = lifeline::guard::acquire_on(env.port).unwrap();
    assert_eq!(lock.local_addr().unwrap().port(), env.port);
}
