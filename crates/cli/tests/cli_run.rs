use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

/// Isolated data dir, config home and runtime overrides for one test.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self { dir: tempdir().expect("tempdir") }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn data_dir(&self) -> PathBuf {
        self.path().join("data")
    }

    /// `easy-exe` with no runtime installed and no user config.
    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("easy-exe");
        cmd.current_dir(self.path())
            .env("XDG_CONFIG_HOME", self.path().join("config"))
            .env("EASYEXE_DOSBOX_BIN", self.path().join("missing-dosbox"))
            .env("EASYEXE_WINE_BIN", self.path().join("missing-wine"))
            .env_remove("EASYEXE_CONFIG")
            .env_remove("EASYEXE_HOME")
            .env_remove("RUST_LOG")
            .arg("--data-dir")
            .arg(self.data_dir());
        cmd
    }

    fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, bytes).expect("write fixture");
        path
    }
}

fn dos_image() -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    bytes[..2].copy_from_slice(b"MZ");
    bytes.extend_from_slice(b"\0Usage: TOOL file\0");
    bytes
}

/// Minimal PE32 GUI image with no sections.
fn pe_image() -> Vec<u8> {
    let mut bytes = vec![0u8; 0x58 + 224];
    bytes[..2].copy_from_slice(b"MZ");
    bytes[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
    bytes[0x40..0x44].copy_from_slice(b"PE\0\0");
    bytes[0x44..0x46].copy_from_slice(&0x014cu16.to_le_bytes());
    bytes[0x54..0x56].copy_from_slice(&224u16.to_le_bytes());
    bytes[0x58..0x5A].copy_from_slice(&0x10bu16.to_le_bytes());
    bytes[0x9C..0x9E].copy_from_slice(&2u16.to_le_bytes());
    bytes
}

/// A dry run prints the decision and leaves the data directory untouched.
#[test]
fn dry_run_prints_json_plan_without_side_effects() {
    let sandbox = Sandbox::new();
    let exe = sandbox.write("TOOL.EXE", &dos_image());

    sandbox
        .cmd()
        .arg(&exe)
        .arg("--dry-run")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""runtime": "dos-emulator""#))
        .stdout(predicate::str::contains(r#""tier": "synthesized""#))
        .stdout(predicate::str::contains(r#""status": "unavailable""#));

    assert!(!sandbox.data_dir().join("environments").exists());
    assert!(!sandbox.data_dir().join("history.db").exists());
}

#[test]
fn dry_run_text_shows_windows_plan() {
    let sandbox = Sandbox::new();
    let exe = sandbox.write("winrar-611.exe", &pe_image());

    sandbox
        .cmd()
        .arg(&exe)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rule:     WinRAR"))
        .stdout(predicate::str::contains("WINEPREFIX="))
        .stdout(predicate::str::contains("WINEARCH=win32"))
        .stderr(predicate::str::contains("native alternatives to WinRAR"));
}

#[test]
fn rule_warning_is_shown() {
    let sandbox = Sandbox::new();
    let exe = sandbox.write("SteamSetup.exe", &pe_image());

    sandbox
        .cmd()
        .arg(&exe)
        .arg("--dry-run")
        .assert()
        .success()
        .stderr(predicate::str::contains("warning: Steam client"));
}

/// Anything without an executable signature exits with 1.
#[test]
fn non_executable_exits_with_format_error() {
    let sandbox = Sandbox::new();
    let notes = sandbox.write("notes.txt", b"just some text, definitely not a program\n");

    sandbox
        .cmd()
        .arg(&notes)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("sniffer failed"));
}

#[test]
fn missing_runtime_exits_with_resolve_error() {
    let sandbox = Sandbox::new();
    let exe = sandbox.write("TOOL.EXE", &dos_image());

    sandbox
        .cmd()
        .arg(&exe)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not available"));

    assert!(!sandbox.data_dir().join("environments").exists());
}

#[test]
fn forced_runtime_must_fit_binary() {
    let sandbox = Sandbox::new();
    let exe = sandbox.write("TOOL.EXE", &dos_image());

    sandbox
        .cmd()
        .arg(&exe)
        .arg("--runtime")
        .arg("windows-layer")
        .arg("--dry-run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot run dos executables"));
}

#[test]
fn conflicting_rule_table_exits_with_two() {
    let sandbox = Sandbox::new();
    let exe = sandbox.write("TOOL.EXE", &dos_image());
    let rules = sandbox.write(
        "rules.yaml",
        b"version: 1\nrules:\n  - name: a\n    match: { name: \"tool.exe\" }\n  - name: b\n    match: { name: \"TOOL.EXE\" }\n",
    );

    sandbox
        .cmd()
        .arg("--rules")
        .arg(&rules)
        .arg(&exe)
        .arg("--dry-run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Rule conflict"));
}

#[test]
fn no_executable_is_an_error() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no executable given"));
}

#[test]
fn invalid_config_file_exits_with_three() {
    let sandbox = Sandbox::new();
    let exe = sandbox.write("TOOL.EXE", &dos_image());
    let config = sandbox.write("config.yaml", b"launch_mode: sideways\n");

    sandbox
        .cmd()
        .arg("--config")
        .arg(&config)
        .arg(&exe)
        .arg("--dry-run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to parse config"));
}
