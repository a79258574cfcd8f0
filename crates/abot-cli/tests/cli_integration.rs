//! CLI integration tests for the `abot` binary.
//!
//! These tests run the actual compiled binary via `std::process::Command`.

use std::process::Command;

/// Build a `Command` pointing at the compiled `abot` binary.
fn abot_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_abot"));
    // Suppress tracing output so test assertions only match program output.
    cmd.env("RUST_LOG", "off");
    cmd
}

// ── 1. Version and help ─────────────────────────────────────────────────

#[test]
fn version_output() {
    let output = abot_bin()
        .arg("--version")
        .output()
        .expect("failed to run abot");

    assert!(output.status.success(), "exit code should be 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("abot") && stdout.contains(env!("CARGO_PKG_VERSION")),
        "unexpected version output: {stdout}"
    );
}

#[test]
fn help_lists_subcommands() {
    let output = abot_bin().arg("--help").output().expect("failed to run abot");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for sub in ["server", "console", "train"] {
        assert!(stdout.contains(sub), "help should mention {sub}: {stdout}");
    }
}

#[test]
fn unknown_subcommand_fails() {
    let output = abot_bin().arg("frobnicate").output().expect("failed to run abot");
    assert!(!output.status.success());
}

// ── 2. Train ────────────────────────────────────────────────────────────

#[test]
fn train_writes_model() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("corpus.txt");
    let model = dir.path().join("intent.bin");
    std::fs::write(&corpus, "_C(get) the _O(weather) _T(today)\n").unwrap();

    let output = abot_bin()
        .arg("train")
        .arg(&corpus)
        .arg(&model)
        .output()
        .expect("failed to run abot");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trained"), "got: {stdout}");
    let bytes = std::fs::read(&model).unwrap();
    assert_eq!(&bytes[..4], b"ABNB");
}

#[test]
fn train_rejects_bad_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("corpus.txt");
    std::fs::write(&corpus, "_Z(bogus) tag\n").unwrap();

    let output = abot_bin()
        .arg("train")
        .arg(&corpus)
        .arg(dir.path().join("intent.bin"))
        .output()
        .expect("failed to run abot");

    assert!(!output.status.success());
    assert!(!dir.path().join("intent.bin").exists());
}

// ── 3. Server configuration ─────────────────────────────────────────────

#[test]
fn server_rejects_bad_env() {
    let output = abot_bin()
        .arg("server")
        .env("ABOT_RPC_PORT", "not-a-port")
        .output()
        .expect("failed to run abot");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ABOT_RPC_PORT"), "got: {stderr}");
}
