//! Two-process ping-pong over `SharedAutoResetEvent`.
//!
//! The test binary re-executes itself as the child process (selected by an
//! environment variable), the same self-spawning pattern used for other
//! cross-process tests in this workspace:
//!
//! ```text
//! [parent] create(ping), create(pong) ── spawn ──► [child] open(ping), open(pong)
//! [parent] set(ping) ───────────────────────────► wait(ping)
//!          wait(pong) ◄────────────────────────── set(pong)
//!          ... ROUND_TRIPS times ...
//! ```
//!
//! Every round trip depends on the auto-reset contract: a `set` releases one
//! wait and is then gone, so the sides stay in lock step.
//!
//! ```bash
//! cargo test -p quartz-sync --test e2e_shared_event -- --nocapture
//! ```

use quartz_sync::SharedAutoResetEvent;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "QUARTZ_E2E_EVENT_ROLE";
const ENV_DIR: &str = "QUARTZ_E2E_EVENT_DIR";
const ROLE_CHILD: &str = "child";
const ROUND_TRIPS: usize = 200;
const WAIT: Duration = Duration::from_secs(10);

fn run_child(dir: &str) {
    let ping = SharedAutoResetEvent::open(format!("{dir}/ping")).expect("child: open ping");
    let pong = SharedAutoResetEvent::open(format!("{dir}/pong")).expect("child: open pong");
    log!("[CHILD] events opened");

    for i in 0..ROUND_TRIPS {
        assert!(ping.wait_one_timeout(WAIT), "child: ping {i} timed out");
        pong.set();
    }
    log!("[CHILD] answered {ROUND_TRIPS} pings");
}

#[test]
fn e2e_two_process_event_ping_pong() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let dir = env::var(ENV_DIR).expect("event dir not set");
        match role.as_str() {
            ROLE_CHILD => run_child(&dir),
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let dir_str = dir.path().to_str().expect("utf-8 temp path").to_owned();
    let ping = SharedAutoResetEvent::create(dir.path().join("ping"), false).expect("create ping");
    let pong = SharedAutoResetEvent::create(dir.path().join("pong"), false).expect("create pong");

    let exe = env::current_exe().expect("Failed to get current executable path");
    let mut child = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_event_ping_pong")
        .env(ENV_ROLE, ROLE_CHILD)
        .env(ENV_DIR, &dir_str)
        .stderr(Stdio::inherit())
        .spawn()
        .expect("Failed to spawn child process");

    for i in 0..ROUND_TRIPS {
        ping.set();
        assert!(pong.wait_one_timeout(WAIT), "parent: pong {i} timed out");
    }
    log!("[PARENT] {ROUND_TRIPS} round trips complete");

    let status = child.wait().expect("Failed to wait for child");
    assert!(status.success(), "child failed with status: {status}");
    assert!(!ping.is_set());
    assert!(!pong.is_set());
}
