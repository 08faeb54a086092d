use coro::{Error, Hub};

use std::env;
use std::process::Command;

const CASE_ENV: &str = "CORO_FATAL_CASE";

/// Runs one fatal case when re-executed by [`run_case`]; passes otherwise.
#[test]
fn fatal_child() {
    let Ok(case) = env::var(CASE_ENV) else {
        return;
    };

    let hub = Hub::new().unwrap();

    match case.as_str() {
        "error" => {
            hub.spawn(|| Err(Error::PeerClosed)).detach();
            let _ = hub.run();
        }
        "panic" => {
            hub.spawn(|| panic!("boom")).detach();
            let _ = hub.run();
        }
        "unblock" => {
            let co = hub.spawn(|| Ok(()));
            co.unblock();
        }
        other => panic!("unknown case {other}"),
    }
}

fn run_case(case: &str) -> String {
    let output = Command::new(env::current_exe().unwrap())
        .args(["fatal_child", "--exact", "--nocapture", "--test-threads=1"])
        .env(CASE_ENV, case)
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    assert!(!output.status.success(), "{case} exited cleanly: {stderr}");
    assert!(stderr.contains("coro: fatal:"), "{case}: {stderr}");

    stderr
}

#[test]
fn error_returned_by_a_coroutine_aborts() {
    let stderr = run_case("error");
    assert!(stderr.contains("coroutine returned an error"), "{stderr}");
}

#[test]
fn panic_in_a_coroutine_aborts() {
    let stderr = run_case("panic");
    assert!(stderr.contains("coroutine panicked"), "{stderr}");
}

#[test]
fn unblocking_a_coroutine_that_is_not_blocked_aborts() {
    let stderr = run_case("unblock");
    assert!(stderr.contains("unblock of coroutine"), "{stderr}");
}
