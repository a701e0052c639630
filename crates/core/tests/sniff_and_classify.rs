mod common;

use std::io::Cursor;
use std::path::Path;

use common::*;
use easyexe_core::classify::classify;
use easyexe_core::model::{BinaryKind, Category, ExtendedHeader, Machine, SubsystemHint};
use easyexe_core::sniff::{sniff_path, sniff_reader, FormatError, MIN_HEADER_LEN};
use tempfile::tempdir;

#[test]
fn short_file_is_truncated() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "tiny.exe", b"MZ\x90\x00");
    match sniff_path(&path) {
        Err(FormatError::Truncated { len, min }) => {
            assert_eq!(len, 4);
            assert_eq!(min, MIN_HEADER_LEN);
        }
        other => panic!("expected Truncated, got {other:?}"),
    }
}

#[test]
fn empty_file_is_truncated() {
    let err = sniff_reader(Path::new("empty.exe"), Cursor::new(Vec::new())).unwrap_err();
    assert!(matches!(err, FormatError::Truncated { len: 0, .. }));
}

#[test]
fn text_file_is_unrecognized() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "readme.txt", b"This is not an executable, just some notes.\n");
    assert!(matches!(sniff_path(&path), Err(FormatError::Unrecognized)));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(sniff_path(&dir.path().join("gone.exe")), Err(FormatError::Io(_))));
}

#[test]
fn plain_mz_image_is_dos() {
    let bytes = dos_image(&[0x90; 200]);
    let fp = sniff_reader(Path::new("TOOL.EXE"), Cursor::new(bytes.clone())).unwrap();
    assert_eq!(fp.kind, BinaryKind::Dos);
    assert_eq!(fp.subsystem, SubsystemHint::Unknown);
    assert_eq!(fp.extended_header, None);
    assert_eq!(fp.size, bytes.len() as u64);
    assert_eq!(fp.hash, sha256_hex(&bytes));
    assert!(fp.imports.is_empty());
}

#[test]
fn reversed_zm_signature_is_accepted() {
    let mut bytes = dos_image(&[0u8; 32]);
    bytes[..2].copy_from_slice(b"ZM");
    let fp = sniff_reader(Path::new("old.exe"), Cursor::new(bytes)).unwrap();
    assert_eq!(fp.kind, BinaryKind::Dos);
}

#[test]
fn pe_console_and_graphical_subsystems() {
    let console = pe_image(MACHINE_I386, SUBSYSTEM_CONSOLE, &[]);
    let fp = sniff_reader(Path::new("cli.exe"), Cursor::new(console)).unwrap();
    assert_eq!(fp.kind, BinaryKind::Windows);
    assert_eq!(fp.subsystem, SubsystemHint::Console);
    assert_eq!(fp.extended_header, Some(ExtendedHeader::Pe));
    assert_eq!(fp.machine, Some(Machine::X86));

    let gui = pe_image(MACHINE_AMD64, SUBSYSTEM_GUI, &[]);
    let fp = sniff_reader(Path::new("gui.exe"), Cursor::new(gui)).unwrap();
    assert_eq!(fp.subsystem, SubsystemHint::Graphical);
    assert_eq!(fp.machine, Some(Machine::X86_64));
}

#[test]
fn ne_header_is_sixteen_bit_windows() {
    let fp = sniff_reader(Path::new("win16.exe"), Cursor::new(stub_with_signature(b"NE"))).unwrap();
    assert_eq!(fp.kind, BinaryKind::Windows);
    assert_eq!(fp.extended_header, Some(ExtendedHeader::Ne));
    assert_eq!(fp.subsystem, SubsystemHint::Graphical);
}

#[test]
fn linear_executable_stays_dos() {
    for sig in [b"LE", b"LX"] {
        let fp = sniff_reader(Path::new("ext.exe"), Cursor::new(stub_with_signature(sig))).unwrap();
        assert_eq!(fp.kind, BinaryKind::Dos);
        assert_eq!(fp.extended_header, Some(ExtendedHeader::Linear));
    }
}

#[test]
fn unknown_extended_signature_falls_back_to_dos() {
    let fp = sniff_reader(Path::new("odd.exe"), Cursor::new(stub_with_signature(b"QQ"))).unwrap();
    assert_eq!(fp.kind, BinaryKind::Dos);
    assert_eq!(fp.extended_header, None);
}

#[test]
fn hash_is_content_identity_not_name() {
    let dir = tempdir().unwrap();
    let bytes = dos_image(b"same body");
    let a = sniff_path(&write(dir.path(), "a.exe", &bytes)).unwrap();
    let b = sniff_path(&write(dir.path(), "b.exe", &bytes)).unwrap();
    assert_eq!(a.hash, b.hash);
    assert_ne!(a.file_name(), b.file_name());
}

#[test]
fn quiet_dos_utility_is_low_confidence_application() {
    let bytes = dos_image(&strings_blob(&["Usage: TOOL [options] file", "Copyright 1991"]));
    let fp = sniff_reader(Path::new("TOOL.EXE"), Cursor::new(bytes)).unwrap();
    let class = classify(&fp);
    assert_eq!(class.category, Category::Application);
    assert!(class.low_confidence);
    assert!(class.confidence < 0.35);
}

#[test]
fn dos_graphics_and_sound_classify_as_game() {
    let mut body = vec![0x90; 16];
    body.extend_from_slice(&[0xB8, 0x13, 0x00, 0xCD, 0x10]);
    body.extend_from_slice(&[0xBA, 0x26, 0x02]);
    body.extend_from_slice(&strings_blob(&["Set BLASTER=A220 I5 D1"]));
    let fp = sniff_reader(Path::new("GAME.EXE"), Cursor::new(dos_image(&body))).unwrap();
    assert!(fp.markers.contains(&"vga-mode-13h".to_string()));
    assert!(fp.markers.contains(&"sound-blaster-port".to_string()));

    let class = classify(&fp);
    assert_eq!(class.category, Category::Game);
    assert!(!class.low_confidence);
    assert!(class.evidence.iter().any(|e| e.starts_with("vga-mode-13h")));
}

#[test]
fn direct3d_reference_makes_windows_game() {
    let bytes = pe_image(MACHINE_I386, SUBSYSTEM_GUI, &strings_blob(&["d3d9.dll", "dsound.dll"]));
    let fp = sniff_reader(Path::new("shooter.exe"), Cursor::new(bytes)).unwrap();
    let class = classify(&fp);
    assert_eq!(class.category, Category::Game);
    assert!(class.confidence > 0.5);
}

#[test]
fn console_windows_tool_is_application() {
    let bytes = pe_image(MACHINE_AMD64, SUBSYSTEM_CONSOLE, &strings_blob(&["comdlg32.dll"]));
    let fp = sniff_reader(Path::new("conv.exe"), Cursor::new(bytes)).unwrap();
    let class = classify(&fp);
    assert_eq!(class.category, Category::Application);
    assert!(!class.low_confidence);
}

#[test]
fn mixed_evidence_resolves_to_application() {
    // One weak game signal against an application signal.
    let bytes = pe_image(MACHINE_I386, SUBSYSTEM_GUI, &strings_blob(&["winmm.dll", "comctl32.dll"]));
    let fp = sniff_reader(Path::new("player.exe"), Cursor::new(bytes)).unwrap();
    let class = classify(&fp);
    assert_eq!(class.category, Category::Application);
}

#[test]
fn classification_is_deterministic() {
    let bytes = pe_image(MACHINE_I386, SUBSYSTEM_GUI, &strings_blob(&["opengl32.dll", "highscore table"]));
    let fp = sniff_reader(Path::new("x.exe"), Cursor::new(bytes)).unwrap();
    assert_eq!(classify(&fp), classify(&fp));
}
