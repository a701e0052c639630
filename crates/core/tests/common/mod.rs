//! Synthetic executable images shared by the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const MACHINE_I386: u16 = 0x014c;
pub const MACHINE_AMD64: u16 = 0x8664;
pub const SUBSYSTEM_GUI: u16 = 2;
pub const SUBSYSTEM_CONSOLE: u16 = 3;

/// Plain DOS image: 64-byte header with no extended header, then `body`.
pub fn dos_image(body: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    bytes[..2].copy_from_slice(b"MZ");
    bytes.extend_from_slice(body);
    bytes
}

/// DOS stub pointing at a `PE\0\0` header with a PE32 (or PE32+) optional
/// header, followed by `tail`.
pub fn pe_image(machine: u16, subsystem: u16, tail: &[u8]) -> Vec<u8> {
    let lfanew = 0x40usize;
    let coff = lfanew + 4;
    let optional = coff + 20;
    let optional_size = 224usize;
    let mut bytes = vec![0u8; optional + optional_size];
    bytes[..2].copy_from_slice(b"MZ");
    bytes[0x3C..0x40].copy_from_slice(&(lfanew as u32).to_le_bytes());
    bytes[lfanew..lfanew + 4].copy_from_slice(b"PE\0\0");
    bytes[coff..coff + 2].copy_from_slice(&machine.to_le_bytes());
    bytes[coff + 16..coff + 18].copy_from_slice(&(optional_size as u16).to_le_bytes());
    let magic: u16 = if machine == MACHINE_AMD64 { 0x20b } else { 0x10b };
    bytes[optional..optional + 2].copy_from_slice(&magic.to_le_bytes());
    bytes[optional + 68..optional + 70].copy_from_slice(&subsystem.to_le_bytes());
    bytes.extend_from_slice(tail);
    bytes
}

/// DOS stub pointing at a two-byte extended signature such as `NE` or `LE`.
pub fn stub_with_signature(signature: &[u8; 2]) -> Vec<u8> {
    let mut bytes = vec![0u8; 0x80];
    bytes[..2].copy_from_slice(b"MZ");
    bytes[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
    bytes[0x40..0x42].copy_from_slice(signature);
    bytes
}

/// NUL-separated printable strings, as they would sit in a data section.
pub fn strings_blob(items: &[&str]) -> Vec<u8> {
    let mut out = vec![0u8];
    for item in items {
        out.extend_from_slice(item.as_bytes());
        out.push(0);
    }
    out
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write fixture");
    path
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(bytes))
}
