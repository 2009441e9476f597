//! Exit codes and output of the `ferrocomm` binary.

use std::process::Command;

fn ferrocomm(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ferrocomm"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("FERROCOMM_NP")
        .output()
        .unwrap()
}

#[test]
fn single_rank_ping_pong_exits_one() {
    let out = ferrocomm(&["-n", "1", "ping-pong"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Need at least 2 ranks."));
    assert!(out.stdout.is_empty());
}

#[test]
fn ping_pong_prints_latency() {
    let out = ferrocomm(&["-n", "2", "ping-pong", "--iterations", "100"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("PingPong: size=8 bytes, latency="));
    assert!(lines[1].contains("stddev="));
    assert!(lines[2].starts_with("Bandwidth: ") && lines[2].ends_with(" MB/s"));
}

#[test]
fn ring_reports_final_token() {
    let out = ferrocomm(&["-n", "4", "ring"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("Rank 0 received final token=45"));
}

#[test]
fn bandwidth_sweep_completes() {
    let out = ferrocomm(&["-n", "2", "bandwidth", "--sizes", "8,1024", "--iterations", "5"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.matches("Bandwidth: ").count(), 2);
    assert!(stdout.contains("Latency: "));
    assert!(stdout.trim_end().ends_with("Bandwidth test completed"));
}

#[test]
fn deadlock_exits_two() {
    let out = ferrocomm(&["-n", "2", "--timeout-ms", "100", "deadlock"]);
    assert_eq!(out.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Process 0: Attempting to send to process 1..."));
    assert!(stdout.contains("Process 1: Attempting to send to process 0..."));
    assert!(!stdout.contains("Send completed"));
}

#[test]
fn fixed_exchange_exits_zero() {
    let out = ferrocomm(&["-n", "2", "deadlock", "--order", "sendrecv"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Process 0: Received 1"));
    assert!(stdout.contains("Process 1: Finalizing"));
    assert!(stdout.trim_end().ends_with("Exchange (sendrecv) completed without deadlock"));
}

#[test]
fn deadlock_demo_needs_two_ranks() {
    let out = ferrocomm(&["-n", "3", "deadlock"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr)
        .contains("This program requires exactly 2 MPI processes"));
}

#[test]
fn zero_ranks_is_a_configuration_error() {
    let out = ferrocomm(&["-n", "0", "ring"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Configuration error"));
}

#[cfg(feature = "rma")]
#[test]
fn race_prints_final_value() {
    let out = ferrocomm(&["-n", "2", "race", "--increments", "50", "--strategy", "accumulate"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Final counter value: 100 (expected: 100)"));
    assert!(stdout.contains("No race detected in this run"));
}
