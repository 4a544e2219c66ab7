// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Integration tests for the `helios-client` and `mock-helios-ls` binaries.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

mod common;

/// Runs `helios-client` isolated from the user's config, feeding `input` on stdin.
fn run_client(home: &Path, args: &[&str], input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_helios-client"))
        .args(args)
        .arg("--nocolor")
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("HOME", home)
        .env("PATH", home.join("bin"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn helios-client");

    child
        .stdin
        .take()
        .expect("Failed to get stdin")
        .write_all(input.as_bytes())
        .expect("Failed to write stdin");
    child.wait_with_output().expect("Failed to wait for helios-client")
}

#[test]
fn test_client_version_flag() {
    let output = Command::new(env!("CARGO_BIN_EXE_helios-client"))
        .arg("--version")
        .output()
        .expect("Failed to run helios-client");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("helios-client {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn test_mock_reports_server_version() {
    let output = Command::new(common::MOCK_SERVER)
        .arg("--version")
        .output()
        .expect("Failed to run mock-helios-ls");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "helios-ls 1.2.3");
}

#[test]
fn test_mock_refuses_other_modes() {
    let output = Command::new(common::MOCK_SERVER)
        .arg("repl")
        .output()
        .expect("Failed to run mock-helios-ls");
    assert_eq!(output.status.code(), Some(2));
}

#[cfg(target_os = "linux")]
#[test]
fn test_resolve_reads_host_settings() {
    let home = tempfile::tempdir().expect("tempdir");
    let bin = home.path().join("bin");
    std::fs::create_dir_all(&bin).expect("bin dir");
    let exe = common::install_mock(&bin);

    let settings_dir = home.path().join("config").join("helios-client");
    std::fs::create_dir_all(&settings_dir).expect("settings dir");
    std::fs::write(
        settings_dir.join("settings.json"),
        serde_json::json!({ "helios.serverPath": exe }).to_string(),
    )
    .expect("settings file");

    let output = run_client(home.path(), &["resolve"], "");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("{}\tconfigured", exe.display())
    );
}

#[cfg(target_os = "linux")]
#[test]
fn test_resolve_searches_path_on_request() {
    let home = tempfile::tempdir().expect("tempdir");
    let bin = home.path().join("bin");
    std::fs::create_dir_all(&bin).expect("bin dir");
    let exe = common::install_mock(&bin);

    // "Find it for me", then "Yes" to saving the path.
    let output = run_client(home.path(), &["resolve"], "2\n2\n");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("{}\tfound-in-PATH", exe.display())
    );

    let saved = std::fs::read_to_string(
        home.path()
            .join("config")
            .join("helios-client")
            .join("settings.json"),
    )
    .expect("settings written");
    assert!(saved.contains(&*exe.to_string_lossy()));
}

#[cfg(target_os = "linux")]
#[test]
fn test_resolve_declined_fails() {
    let home = tempfile::tempdir().expect("tempdir");
    let output = run_client(home.path(), &["resolve"], "1\n");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn test_version_subcommand() {
    let home = tempfile::tempdir().expect("tempdir");
    let bin = home.path().join("bin");
    std::fs::create_dir_all(&bin).expect("bin dir");
    common::install_mock(&bin);
    let cached = home.path().join("data").join("helios-client");
    std::fs::create_dir_all(&cached).expect("storage dir");
    common::install_mock(&cached);

    let output = run_client(home.path(), &["version"], "");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "Helios-LS 1.2.3");
}

#[cfg(target_os = "linux")]
#[test]
fn test_run_quits_on_command() {
    let home = tempfile::tempdir().expect("tempdir");
    let bin = home.path().join("bin");
    std::fs::create_dir_all(&bin).expect("bin dir");
    let cached = home.path().join("data").join("helios-client");
    std::fs::create_dir_all(&cached).expect("storage dir");
    common::install_mock(&cached);

    let output = run_client(home.path(), &["run"], "syntax-tree\nquit\n");
    assert!(output.status.success(), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Not yet implemented."), "{stderr}");
}
