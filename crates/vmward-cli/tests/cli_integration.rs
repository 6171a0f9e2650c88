//! CLI integration tests for the `vmward` binary.
//!
//! Each test spawns the compiled binary with every settings path pointed
//! into a temp directory, so no real ledger or identity is ever touched.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::{Value, json};
use tempfile::TempDir;

/// Build a `Command` for the `vmward` binary isolated under `home`.
fn vmward_bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vmward"));
    cmd.env("HOME", home)
        .env("VMWARD_IDENTITY_PATH", home.join("identity"))
        .env("VMWARD_SSH_PUBKEY_PATH", home.join("key.pub"))
        .env("VMWARD_LEDGER_PATH", home.join("inventory.json"))
        // Nothing listens here; tests that reach the network must fail fast.
        .env("VMWARD_GATEWAY_URL", "http://127.0.0.1:9")
        .env("VMWARD_REQUEST_TIMEOUT_SECS", "2");
    // Suppress tracing output so test assertions only match program output.
    cmd.env("RUST_LOG", "off");
    cmd
}

// ── 1. Version and help ─────────────────────────────────────────────────

#[test]
fn version_output() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .arg("--version")
        .output()
        .expect("failed to run vmward");

    assert!(output.status.success(), "exit code should be 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("vmward") && stdout.contains("0.1.0"),
        "version output should contain 'vmward' and '0.1.0', got: {stdout}"
    );
}

#[test]
fn help_lists_subcommands() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .arg("--help")
        .output()
        .expect("failed to run vmward");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("VM lifecycle tools for agents"));
    for sub in ["serve", "status", "config"] {
        assert!(stdout.contains(sub), "help should mention {sub}: {stdout}");
    }
}

#[test]
fn serve_help_mentions_read_only() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .args(["serve", "--help"])
        .output()
        .expect("failed to run vmward");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("--read-only"));
}

// ── 2. Config ───────────────────────────────────────────────────────────

#[test]
fn config_show_reflects_environment() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .args(["config", "show"])
        .env("VMWARD_COST_THRESHOLD", "25")
        .output()
        .expect("failed to run vmward");

    assert!(output.status.success());
    let settings: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(settings["cost_threshold"], 25.0);
    assert_eq!(
        settings["ledger_path"],
        home.path().join("inventory.json").display().to_string()
    );
    assert_eq!(settings["max_concurrent_vms"], 3);
}

#[test]
fn config_get_unknown_setting_fails() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .args(["config", "get", "nonexistent"])
        .output()
        .expect("failed to run vmward");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown setting"));
}

#[test]
fn config_vars_lists_prefixed_names() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .args(["config", "vars"])
        .output()
        .expect("failed to run vmward");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().any(|l| l == "VMWARD_MAX_SESSION_SPEND"));
}

#[test]
fn invalid_setting_is_an_error() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .args(["config", "show"])
        .env("VMWARD_COST_THRESHOLD", "lots")
        .output()
        .expect("failed to run vmward");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("VMWARD_COST_THRESHOLD"), "got: {stderr}");
}

// ── 3. Status ───────────────────────────────────────────────────────────

#[test]
fn offline_status_reads_ledger() {
    let home = tempfile::tempdir().unwrap();
    let ledger = json!([{
        "item_hash": "abc123",
        "name": "worker",
        "node_hash": "node-1",
        "node_url": "https://node1.example.com",
        "compute_units": 2,
        "created_at": "2020-01-01T00:00:00Z",
        "ttl_expires_at": "2020-01-01T04:00:00Z",
        "hourly_cost": 2.85
    }]);
    std::fs::write(home.path().join("inventory.json"), ledger.to_string()).unwrap();

    let output = vmward_bin(home.path())
        .args(["status", "--offline"])
        .output()
        .expect("failed to run vmward");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tracked VMs:  1"), "got: {stdout}");
    assert!(stdout.contains("[EXPIRED] worker (abc123)"), "got: {stdout}");
}

#[test]
fn offline_status_json_on_empty_ledger() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .args(["status", "--offline", "--json"])
        .output()
        .expect("failed to run vmward");

    assert!(output.status.success());
    let vms: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(vms, json!([]));
}

#[test]
fn online_status_without_identity_fails() {
    let home = tempfile::tempdir().unwrap();
    let output = vmward_bin(home.path())
        .arg("status")
        .output()
        .expect("failed to run vmward");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load identity"));
}

// ── 4. Serve ────────────────────────────────────────────────────────────

fn serve(home: &TempDir, extra: &[&str], input: &str) -> Vec<Value> {
    std::fs::write(home.path().join("identity"), "0xAgentSigner\n").unwrap();
    let mut child = vmward_bin(home.path())
        .arg("serve")
        .args(extra)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn vmward serve");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "serve failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

const HANDSHAKE: &str = concat!(
    r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
    "\n",
    r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
    "\n",
    r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
    "\n",
);

#[test]
fn serve_answers_handshake_and_lists_tools() {
    let home = tempfile::tempdir().unwrap();
    let responses = serve(&home, &[], HANDSHAKE);

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "vmward");
    let tools = responses[1]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 6);
}

#[test]
fn read_only_serve_hides_spending_tools() {
    let home = tempfile::tempdir().unwrap();
    let responses = serve(&home, &["--read-only"], HANDSHAKE);

    let names: Vec<&str> = responses[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["check_balance", "list_nodes", "list_my_vms"]);
}

#[test]
fn unreachable_gateway_is_a_tool_error() {
    let home = tempfile::tempdir().unwrap();
    let input = format!(
        "{HANDSHAKE}{}\n",
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"list_nodes","arguments":{}}}"#
    );
    let responses = serve(&home, &[], &input);

    let result = &responses[2]["result"];
    assert_eq!(result["isError"], true);
    let payload: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert!(payload["error"].is_string());
}
