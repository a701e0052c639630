use std::fs;

use easy_exe::{canonicalize_or_current, exit_code_for};
use easyexe_core::pipeline::{PipelineError, PipelineErrorKind, Stage};
use easyexe_core::sniff::FormatError;
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("prog.exe");
    fs::write(&file, b"MZ").expect("write");
    let result = canonicalize_or_current(&file).expect("canonicalize");
    assert_eq!(result, file.canonicalize().expect("canon"));
}

#[test]
fn canonicalize_or_current_keeps_missing_absolute_path() {
    let tmp = tempdir().expect("tempdir");
    let missing = tmp.path().join("gone.exe");
    assert_eq!(canonicalize_or_current(&missing).expect("path"), missing);
}

#[test]
fn pipeline_errors_keep_their_exit_code_through_context() {
    let err = PipelineError {
        stage: Stage::Fingerprinted,
        input: "x.exe".into(),
        kind: PipelineErrorKind::Format(FormatError::Unrecognized),
    };
    let wrapped = anyhow::Error::new(err).context("while running x.exe");
    assert_eq!(exit_code_for(&wrapped), 1);
}
