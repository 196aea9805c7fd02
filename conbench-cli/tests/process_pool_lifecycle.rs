//! Worker lifecycle under the process-pool strategy
//!
//! These tests watch the children of the test process through `/proc`, so
//! they run one at a time and live apart from the other process-pool tests.

use conbench_cli::BoundedExecutor;
use conbench_core::{RunError, Strategy, TaskConfig, WorkloadSpec};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

const BIN: &str = env!("CARGO_BIN_EXE_conbench");

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pids whose parent is this process, zombies included
fn child_pids() -> Vec<u32> {
    let me = std::process::id();
    let mut pids = Vec::new();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return pids;
    };
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        // "pid (comm) state ppid ..."; comm may contain spaces
        let Some((_, rest)) = stat.rsplit_once(')') else {
            continue;
        };
        let ppid = rest.split_whitespace().nth(1).and_then(|p| p.parse::<u32>().ok());
        if ppid == Some(me) {
            pids.push(pid);
        }
    }
    pids
}

fn fixed_io(latency: Duration) -> WorkloadSpec {
    WorkloadSpec::simulated_io(latency, latency)
}

#[test]
fn test_exactly_c_workers_serve_the_run() {
    let _serial = serial();
    let latency = Duration::from_millis(60);
    let config = TaskConfig::new(12, 3, fixed_io(latency), Strategy::ProcessPool).unwrap();
    let runner = thread::spawn(move || BoundedExecutor::new(config).with_worker_binary(BIN).run());

    let mut seen = HashSet::new();
    let mut peak = 0;
    while !runner.is_finished() {
        let live = child_pids();
        peak = peak.max(live.len());
        seen.extend(live);
        thread::sleep(Duration::from_millis(5));
    }
    let outcome = runner.join().unwrap().unwrap();

    assert_eq!(outcome.timings.len(), 12);
    assert!(peak <= 3, "{peak} workers alive at once");
    assert_eq!(seen.len(), 3, "workers seen: {seen:?}");
    // 12 tasks through 3 slots take at least 4 rounds, and far fewer than 12
    assert!(outcome.elapsed >= latency * 4);
    assert!(outcome.elapsed < latency * 12);
    assert!(child_pids().is_empty());
}

#[test]
fn test_killed_worker_fails_the_run_and_leaves_no_children() {
    let _serial = serial();
    let latency = Duration::from_millis(50);
    // 200 tasks over 2 workers would take about 5s
    let config = TaskConfig::new(200, 2, fixed_io(latency), Strategy::ProcessPool).unwrap();
    let started = Instant::now();
    let runner = thread::spawn(move || BoundedExecutor::new(config).with_worker_binary(BIN).run());

    let victim = loop {
        let live = child_pids();
        if live.len() == 2 {
            break live[0];
        }
        assert!(!runner.is_finished(), "run ended before both workers started");
        thread::sleep(Duration::from_millis(5));
    };
    // let both workers finish the handshake and pick up tasks
    thread::sleep(latency * 2);
    let ret = unsafe { libc::kill(victim as libc::pid_t, libc::SIGKILL) };
    assert_eq!(ret, 0);

    let err = runner.join().unwrap().unwrap_err();
    assert!(matches!(err, RunError::Workload { .. }), "unexpected error {err}");
    // the surviving driver drained its task and stopped instead of running
    // the remaining queue
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(child_pids().is_empty());
}
