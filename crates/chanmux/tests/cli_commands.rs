#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/chanmux-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn chanmux() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_chanmux"));
    command.arg("--log-level").arg("error");
    command
}

fn spawn_server(subcommand: &str, sock_path: &Path, extra: &[&str]) -> Child {
    let child = chanmux()
        .arg(subcommand)
        .arg(sock_path)
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("server command should start");
    wait_for_socket(sock_path, Duration::from_secs(3));
    child
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket {} never appeared", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn send(sock_path: &Path, args: &[&str]) -> Output {
    chanmux()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(sock_path)
        .args(args)
        .output()
        .expect("send should run")
}

#[test]
fn send_wait_prints_echoed_payload() {
    let dir = unique_temp_dir("echo");
    let sock_path = dir.join("echo.sock");
    let mut server = spawn_server("echo", &sock_path, &[]);

    let output = send(
        &sock_path,
        &["--name", "greeting", "--json", r#"{"hello":"world"}"#, "--wait"],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reply: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send should emit json");
    assert_eq!(reply["channel"], "greeting");
    assert_eq!(reply["payload"], r#"{"hello":"world"}"#);
    assert_eq!(reply["size"], 17);

    let _ = server.kill();
    let _ = server.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_prints_complete_channels_then_exits() {
    let dir = unique_temp_dir("listen");
    let sock_path = dir.join("listen.sock");
    let server = spawn_server("listen", &sock_path, &["--count", "1", "--format", "json"]);

    let output = send(&sock_path, &["--name", "logs", "--data", "one line"]);
    assert!(output.status.success());

    let listed = server.wait_with_output().expect("listen should exit");
    assert!(listed.status.success());
    let message: serde_json::Value =
        serde_json::from_slice(&listed.stdout).expect("listen should emit json");
    assert_eq!(message["channel"], "logs");
    assert_eq!(message["payload"], "one line");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_missing_socket_fails() {
    let missing = unique_temp_dir("missing").join("nobody.sock");
    let output = send(&missing, &["--data", "x"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn invalid_json_payload_is_a_usage_error() {
    let missing = unique_temp_dir("usage").join("unused.sock");
    let output = send(&missing, &["--json", "{nope"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn unreadable_config_is_rejected() {
    let dir = unique_temp_dir("config");
    let config = dir.join("mux.json");
    std::fs::write(&config, "[1, 2").expect("config should be writable");

    let output = chanmux()
        .arg("--config")
        .arg(&config)
        .arg("version")
        .output()
        .expect("version should run");
    assert_eq!(output.status.code(), Some(60));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_package_version() {
    let output = chanmux()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("chanmux {}", env!("CARGO_PKG_VERSION")));
}
