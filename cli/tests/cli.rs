use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use async_fs as afs;
use futures_lite::future::block_on;

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("drum_coach_test_{}_{name}", std::process::id()));
    block_on(afs::write(&path, contents)).unwrap();
    path
}

#[test]
fn timeline_prints_retimed_events_in_time_order() {
    let pattern = temp_file(
        "timeline.json",
        r#"{ "subdivision": 4,
            "pattern": [{ "step": 4, "note": "snare" }, { "step": 0, "note": 36 }, { "step": 2, "note": "hihat" }] }"#,
    );

    let bin = env!("CARGO_BIN_EXE_drum-coach");
    let out = Command::new(bin)
        .args(["--bpm", "120", "timeline", "--pattern"])
        .arg(&pattern)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout, "0\tkick\t0.000\n2\thihat\t0.250\n4\tsnare\t0.500\n");

    let _ = block_on(afs::remove_file(&pattern));
}

#[test]
fn config_file_sets_tempo() {
    let pattern = temp_file(
        "config_tempo.json",
        r#"{ "pattern": [{ "step": 1, "note": "kick" }] }"#,
    );
    let config = temp_file("config_tempo.toml", "[tempo]\nbpm = 60\n");

    let bin = env!("CARGO_BIN_EXE_drum-coach");
    let out = Command::new(bin)
        .arg("--config")
        .arg(&config)
        .args(["timeline", "--pattern"])
        .arg(&pattern)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "1\tkick\t0.250\n");

    let _ = block_on(afs::remove_file(&pattern));
    let _ = block_on(afs::remove_file(&config));
}

#[test]
fn malformed_pattern_fails() {
    let pattern = temp_file(
        "malformed.json",
        r#"{ "pattern": [{ "step": -1, "note": "kick" }] }"#,
    );

    let bin = env!("CARGO_BIN_EXE_drum-coach");
    let out = Command::new(bin)
        .args(["timeline", "--pattern"])
        .arg(&pattern)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());

    let _ = block_on(afs::remove_file(&pattern));
}

#[test]
fn play_exits_cleanly_on_quit() {
    let pattern = temp_file(
        "play.json",
        r#"{ "pattern": [{ "step": 0, "note": "kick" }, { "step": 4, "note": "snare" }] }"#,
    );

    let bin = env!("CARGO_BIN_EXE_drum-coach");
    let mut child = Command::new(bin)
        .args(["play", "--pattern"])
        .arg(&pattern)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    {
        let stdin = child.stdin.as_mut().unwrap();
        stdin.write_all(b"bpm 90\nstop\nquit\n").unwrap();
    }
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());

    let _ = block_on(afs::remove_file(&pattern));
}
