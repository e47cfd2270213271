//! Integration tests for ags-cli.
//!
//! Tests invoke the built `ags` binary and check its output.

use std::process::Command;

use tempfile::TempDir;

/// Helper to get the path to the `ags` binary built by cargo.
fn ags_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ags"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, body).unwrap();
    path
}

// ---------------------------------------------------------------------------
// `ags config`
// ---------------------------------------------------------------------------

#[test]
fn cli_config_path_names_the_engine_file() {
    let output = ags_bin()
        .args(["config", "path"])
        .output()
        .expect("failed to run ags config path");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.trim_end().ends_with("engine.toml"), "got: {stdout}");
}

#[test]
fn cli_config_init_then_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sub").join("engine.toml");

    let output = ags_bin()
        .args(["config", "init", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run ags config init");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(path.is_file());

    let again = ags_bin()
        .args(["config", "init", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!again.status.success(), "init must not overwrite without --force");

    let show = ags_bin()
        .args(["config", "show", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(show.status.success());
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("samplerate = 44100"), "got: {stdout}");
    assert!(stdout.contains("resolve_passes = \"per-recall\""), "got: {stdout}");
}

#[test]
fn cli_config_show_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "buffer_size = 2\n");
    let output = ags_bin()
        .args(["config", "show", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("buffer_size"), "got: {stderr}");
}

// ---------------------------------------------------------------------------
// `ags render`
// ---------------------------------------------------------------------------

#[test]
fn cli_render_drone_reaches_every_channel() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "buffer_size = 128\nrealtime_budget = 100.0\n");
    let output = ags_bin()
        .args(["render", "--ticks", "20", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run ags render");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Rendered 2560 frames"), "got: {stdout}");
    assert!(stdout.contains("Ticks: 20"), "got: {stdout}");
    assert!(stdout.contains("channel 0: peak 0.2"), "got: {stdout}");
    assert!(stdout.contains("channel 1: peak 0.2"), "got: {stdout}");
}

#[test]
fn cli_render_notes_start_and_finish_voices() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "buffer_size = 128\nrealtime_budget = 100.0\n");
    let output = ags_bin()
        .args(["render", "--ticks", "40", "--notes", "60,64", "--note-ticks", "8", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Ticks: 40"), "got: {stdout}");
    // Two notes on two lines, every voice stopped by its note-off.
    assert!(stdout.contains("4 cancelled"), "got: {stdout}");
    assert!(!stdout.contains("-inf dBFS"), "got: {stdout}");
}

#[test]
fn cli_render_fails_on_missing_config() {
    let dir = TempDir::new().unwrap();
    let output = ags_bin()
        .args(["render", "--config"])
        .arg(dir.path().join("missing.toml"))
        .output()
        .unwrap();
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// `ags run`
// ---------------------------------------------------------------------------

#[test]
fn cli_run_stops_after_the_tick_limit() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "samplerate = 48000\nbuffer_size = 480\nrealtime_budget = 100.0\n",
    );
    let output = ags_bin()
        .args(["run", "--ticks", "30", "--super-threaded", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run ags run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("6 channel thread(s)"), "got: {stdout}");
    assert!(stdout.contains("Done!"), "got: {stdout}");
    assert!(stdout.contains("Notes played:"), "got: {stdout}");
}
