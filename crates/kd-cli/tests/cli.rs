use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::fs;

const KEYMAP: &str = "layers:\n  base: [[Q, W], [\"⇧\", Ü]]\n";

// Nothing listens here; a request reaching it would fail the command differently.
const DEAD_API: &str = "http://127.0.0.1:9";

#[test]
fn permalink_round_trips_through_the_binary() {
    let temp = tempfile::tempdir().expect("tempdir");
    let keymap = temp.path().join("keymap.yaml");
    fs::write(&keymap, KEYMAP).expect("write keymap");

    let encoded = cargo_bin_cmd!("kd")
        .args(["permalink", "encode"])
        .arg(&keymap)
        .assert()
        .success();
    let link = String::from_utf8(encoded.get_output().stdout.clone()).expect("utf8");
    let link = link.trim();
    assert!(link.starts_with("https://caksoylar.github.io/keymap-drawer?keymap_yaml="));

    let decoded = cargo_bin_cmd!("kd")
        .args(["permalink", "decode", link])
        .assert()
        .success();
    assert_eq!(decoded.get_output().stdout, KEYMAP.as_bytes());
}

#[test]
fn permalink_encode_reads_stdin() {
    let assert = cargo_bin_cmd!("kd")
        .args(["--json", "permalink", "encode"])
        .write_stdin(KEYMAP)
        .assert()
        .success();
    let payload: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    assert_eq!(payload["status"], "ok");
    let link = payload["details"]["permalink"].as_str().expect("permalink");
    let param = link.split_once("keymap_yaml=").expect("param").1;

    let decoded = cargo_bin_cmd!("kd")
        .args(["permalink", "decode", param])
        .assert()
        .success();
    assert_eq!(decoded.get_output().stdout, KEYMAP.as_bytes());
}

#[test]
fn undecodable_permalink_is_a_user_error() {
    let assert = cargo_bin_cmd!("kd")
        .args(["permalink", "decode", "not-a-permalink"])
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("Could not decode permalink"), "{stderr}");
}

#[test]
fn parse_rejects_foreign_hosts_without_network() {
    let assert = cargo_bin_cmd!("kd")
        .env("KD_FORGE_API", DEAD_API)
        .args([
            "parse",
            "https://gitlab.com/acme/zmk-config/blob/main/config/kb.keymap",
        ])
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("Please provide a github.com URL"), "{stderr}");
    assert!(assert.get_output().stdout.is_empty());
}

#[test]
fn parse_failure_json_envelope_carries_hint() {
    let assert = cargo_bin_cmd!("kd")
        .env("KD_FORGE_API", DEAD_API)
        .args([
            "--json",
            "parse",
            "https://github.com/acme/zmk-config/blob/main/config/kb.overlay",
        ])
        .assert()
        .code(1);
    let payload: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    assert_eq!(payload["status"], "user_error");
    assert_eq!(
        payload["message"],
        "Please provide URL to a .keymap file (got 'kb.overlay')"
    );
    assert!(payload["details"]["hint"].is_string());
}

#[test]
fn draw_reads_keymap_yaml() {
    let temp = tempfile::tempdir().expect("tempdir");
    let keymap = temp.path().join("keymap.yaml");
    fs::write(&keymap, "# drawn later\n".to_string() + KEYMAP).expect("write keymap");

    // The keymap has no layout, so drawing stops right after the keymap is read.
    let assert = cargo_bin_cmd!("kd")
        .args(["--json", "draw"])
        .arg(&keymap)
        .assert()
        .code(2);
    let payload: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    assert_eq!(payload["message"], "Error while drawing SVG");
    let error = payload["details"]["error"].as_str().expect("error");
    assert!(error.contains("physical layout needs to be specified"), "{error}");
}

#[test]
fn local_file_of_unknown_kind_asks_for_kind() {
    let temp = tempfile::tempdir().expect("tempdir");
    let keymap = temp.path().join("keymap.txt");
    fs::write(&keymap, "").expect("write keymap");

    let assert = cargo_bin_cmd!("kd")
        .args(["parse", "--file"])
        .arg(&keymap)
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("Cannot tell which parser"), "{stderr}");
    assert!(stderr.contains("--kind"), "{stderr}");
}

#[test]
fn missing_local_file_is_a_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = cargo_bin_cmd!("kd")
        .args(["--json", "parse", "--kind", "kanata", "--file"])
        .arg(temp.path().join("sweep.kbd"))
        .assert()
        .code(1);
    let payload: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    assert_eq!(payload["status"], "user_error");
    let message = payload["message"].as_str().expect("message");
    assert!(message.starts_with("Could not read keymap file"), "{message}");
}

#[test]
fn parse_takes_a_url_or_a_file_not_both() {
    cargo_bin_cmd!("kd")
        .args([
            "parse",
            "https://github.com/acme/zmk-config/blob/main/config/kb.keymap",
            "--file",
            "kb.keymap",
        ])
        .assert()
        .failure();
    cargo_bin_cmd!("kd")
        .args(["parse", "--kind", "qmk"])
        .assert()
        .failure();
}

#[test]
fn help_banner_is_plain_ascii() {
    let assert = cargo_bin_cmd!("kd").arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("keymap-drawer from a repository URL"), "{stdout}");
    assert!(stdout.is_ascii(), "{stdout}");
}
