#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/serialcmd-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn spawn_simulator(sock_path: &Path) -> Child {
    let child = Command::new(env!("CARGO_BIN_EXE_serialcmd"))
        .args(["--log-level", "error", "simulate"])
        .arg(sock_path)
        .args(["--device-name", "bench-sim"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("simulate command should start");
    wait_for_socket(sock_path, Duration::from_secs(3));
    child
}

fn send_json(sock_path: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_serialcmd"))
        .args(["--log-level", "error", "--format", "json", "send"])
        .arg(sock_path)
        .args(extra)
        .output()
        .expect("send should run")
}

fn stop(mut child: Child, dir: &Path) {
    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn send_version_against_simulator() {
    let dir = unique_temp_dir("version");
    let sock_path = dir.join("bridge.sock");
    let child = spawn_simulator(&sock_path);

    let output = send_json(&sock_path, &["--cmd", "version", "--wait"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command\":\"version\""));
    assert!(stdout.contains(&format!("\"decoded\":\"{}\"", env!("CARGO_PKG_VERSION"))));

    let output = send_json(&sock_path, &["--cmd", "get-device-name", "--wait"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("\"payload\":\"bench-sim\""));

    stop(child, &dir);
}

#[test]
fn unknown_command_is_answered_by_fallback() {
    let dir = unique_temp_dir("fallback");
    let sock_path = dir.join("bridge.sock");
    let child = spawn_simulator(&sock_path);

    let output = send_json(&sock_path, &["--cmd", "0x40", "--wait"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command\":\"invalid-cmd\""));
    assert!(stdout.contains("\"rejected\":\"0x40\""));

    stop(child, &dir);
}

#[test]
fn device_state_persists_across_links() {
    let dir = unique_temp_dir("state");
    let sock_path = dir.join("bridge.sock");
    let child = spawn_simulator(&sock_path);

    let output = send_json(&sock_path, &["--cmd", "start-ap", "--wait"]);
    assert!(output.status.success());

    let output = send_json(&sock_path, &["--cmd", "get-connection-info", "--wait"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"ap\":\"acting-as-ap\""), "stdout: {stdout}");

    let output = send_json(&sock_path, &["--cmd", "get-ip", "--wait"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("192.168.4.1"));

    stop(child, &dir);
}

#[test]
fn listen_prints_frames_after_noise() {
    let dir = unique_temp_dir("listen");
    let sock_path = dir.join("listen.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_serialcmd"))
        .args(["--log-level", "error", "--format", "json", "listen"])
        .arg(&sock_path)
        .args(["--bind", "--count", "1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let mut link = UnixStream::connect(&sock_path).expect("connect should succeed");
    link.write_all(&[0x00, 0xAA, 0x13, 0x55, 0x1A, 0x00, 0xAA])
        .expect("write should succeed");

    let output = child.wait_with_output().expect("listen should exit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command\":\"time\""), "stdout: {stdout}");
    assert!(stdout.contains("\"payload_size\":0"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn wait_without_reply_times_out_with_124() {
    let dir = unique_temp_dir("timeout");
    let sock_path = dir.join("silent.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_serialcmd"))
        .args(["--log-level", "error", "listen"])
        .arg(&sock_path)
        .arg("--bind")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let output = send_json(
        &sock_path,
        &["--cmd", "version", "--wait", "--wait-timeout", "300ms"],
    );
    assert_eq!(output.status.code(), Some(124));

    stop(child, &dir);
}

#[test]
fn send_to_missing_target_is_transport_error() {
    let dir = unique_temp_dir("missing");
    let output = send_json(&dir.join("absent.sock"), &["--cmd", "version"]);
    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn oversized_payload_is_rejected_with_60() {
    let dir = unique_temp_dir("oversize");
    let sock_path = dir.join("bridge.sock");
    let child = spawn_simulator(&sock_path);

    let output = send_json(
        &sock_path,
        &["--cmd", "publish-info", "--data", &"x".repeat(200)],
    );
    assert_eq!(output.status.code(), Some(60));

    stop(child, &dir);
}
