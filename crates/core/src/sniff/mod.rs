//! Format sniffer: header validation, identity hashing, and best-effort
//! extraction of imports, strings and code markers.
//!
//! Header decisions only ever look at the leading bytes; the content hash and
//! size always cover the whole stream so fallback matching still works for
//! oddly structured files.

mod markers;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::model::{BinaryKind, ExecutableFingerprint, ExtendedHeader, Machine, SubsystemHint};

pub use markers::DOS_MARKERS;

/// Fixed part of the DOS header (through `e_ovno`).
pub const MIN_HEADER_LEN: usize = 28;

/// Offset of `e_lfanew`, the pointer to the extended header.
const E_LFANEW_OFFSET: usize = 0x3C;

/// Bytes retained in memory for header parsing and heuristic scanning.
pub const SCAN_LIMIT: usize = 16 * 1024 * 1024;

const MIN_STRING_LEN: usize = 5;
const MAX_STRINGS: usize = 4096;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("file is {len} bytes, shorter than the {min}-byte executable header")]
    Truncated { len: u64, min: usize },
    #[error("no DOS or Windows executable signature found")]
    Unrecognized,
    #[error("failed to read executable: {0}")]
    Io(#[from] std::io::Error),
}

/// Sniff the executable at `path`.
pub fn sniff_path(path: &Path) -> Result<ExecutableFingerprint, FormatError> {
    let file = File::open(path)?;
    sniff_reader(path, BufReader::new(file))
}

/// Sniff an executable from any byte stream; `path` is only recorded.
pub fn sniff_reader<R: Read>(path: &Path, mut reader: R) -> Result<ExecutableFingerprint, FormatError> {
    let mut hasher = Sha256::new();
    let mut head: Vec<u8> = Vec::new();
    let mut size: u64 = 0;
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
        if head.len() < SCAN_LIMIT {
            let take = n.min(SCAN_LIMIT - head.len());
            head.extend_from_slice(&buf[..take]);
        }
    }
    let hash = format!("{:x}", hasher.finalize());
    let complete = size as usize == head.len();

    let header = parse_header(&head, size)?;

    let (imports, markers) = match header.kind {
        BinaryKind::Windows => {
            let imports = if complete && header.extended == Some(ExtendedHeader::Pe) {
                extract_imports(&head)
            } else {
                Vec::new()
            };
            (imports, Vec::new())
        }
        BinaryKind::Dos => (Vec::new(), markers::scan(&head)),
    };
    let strings = extract_strings(&head);

    debug!(
        path = %path.display(),
        kind = header.kind.as_str(),
        size,
        imports = imports.len(),
        markers = markers.len(),
        "sniffed executable"
    );

    Ok(ExecutableFingerprint {
        path: path.to_path_buf(),
        kind: header.kind,
        subsystem: header.subsystem,
        extended_header: header.extended,
        machine: header.machine,
        hash,
        size,
        imports,
        strings,
        markers,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeaderInfo {
    kind: BinaryKind,
    subsystem: SubsystemHint,
    extended: Option<ExtendedHeader>,
    machine: Option<Machine>,
}

const DOS_ONLY: HeaderInfo = HeaderInfo {
    kind: BinaryKind::Dos,
    subsystem: SubsystemHint::Unknown,
    extended: None,
    machine: None,
};

fn parse_header(head: &[u8], size: u64) -> Result<HeaderInfo, FormatError> {
    if head.len() < MIN_HEADER_LEN {
        return Err(FormatError::Truncated { len: size, min: MIN_HEADER_LEN });
    }
    if &head[..2] != b"MZ" && &head[..2] != b"ZM" {
        return Err(FormatError::Unrecognized);
    }
    if head.len() < E_LFANEW_OFFSET + 4 {
        return Ok(DOS_ONLY);
    }

    let lfanew = read_u32(head, E_LFANEW_OFFSET).unwrap_or(0) as usize;
    if lfanew < E_LFANEW_OFFSET + 4 {
        return Ok(DOS_ONLY);
    }
    let Some(signature) = head.get(lfanew..lfanew + 4) else {
        return Ok(DOS_ONLY);
    };

    if signature == b"PE\0\0" {
        return Ok(parse_pe(head, lfanew).unwrap_or(DOS_ONLY));
    }
    match &signature[..2] {
        b"NE" => Ok(HeaderInfo {
            kind: BinaryKind::Windows,
            subsystem: SubsystemHint::Graphical,
            extended: Some(ExtendedHeader::Ne),
            machine: Some(Machine::X86),
        }),
        b"LE" | b"LX" => Ok(HeaderInfo { extended: Some(ExtendedHeader::Linear), ..DOS_ONLY }),
        _ => Ok(DOS_ONLY),
    }
}

/// Validate the COFF and optional header behind a `PE\0\0` signature.
///
/// Returns `None` when the chained header is cut short or carries an unknown
/// optional-header magic, in which case the file is treated as DOS-only.
fn parse_pe(head: &[u8], lfanew: usize) -> Option<HeaderInfo> {
    let coff = lfanew + 4;
    let machine = read_u16(head, coff)?;
    let optional_size = read_u16(head, coff + 16)? as usize;
    let optional = coff + 20;
    let magic = read_u16(head, optional)?;
    if magic != 0x10b && magic != 0x20b {
        return None;
    }
    // Subsystem sits at the same offset in PE32 and PE32+.
    let subsystem = if optional_size >= 70 {
        match read_u16(head, optional + 68)? {
            2 => SubsystemHint::Graphical,
            3 => SubsystemHint::Console,
            _ => SubsystemHint::Unknown,
        }
    } else {
        SubsystemHint::Unknown
    };
    let machine = match machine {
        0x014c => Machine::X86,
        0x8664 => Machine::X86_64,
        0xaa64 => Machine::Arm64,
        _ => Machine::Other,
    };

    Some(HeaderInfo {
        kind: BinaryKind::Windows,
        subsystem,
        extended: Some(ExtendedHeader::Pe),
        machine: Some(machine),
    })
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Library and symbol names from the PE import directory, lowercased.
fn extract_imports(bytes: &[u8]) -> Vec<String> {
    let pe = match goblin::pe::PE::parse(bytes) {
        Ok(pe) => pe,
        Err(err) => {
            debug!("import table unavailable: {err}");
            return Vec::new();
        }
    };
    let mut out: Vec<String> = pe.libraries.iter().map(|lib| lib.to_ascii_lowercase()).collect();
    out.extend(pe.imports.iter().map(|imp| imp.name.to_ascii_lowercase()));
    out.sort();
    out.dedup();
    out
}

/// Printable ASCII runs of at least `MIN_STRING_LEN` bytes.
fn extract_strings(bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, &byte) in bytes.iter().enumerate() {
        let printable = (0x20..0x7f).contains(&byte);
        match (printable, start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                if idx - s >= MIN_STRING_LEN {
                    out.push(String::from_utf8_lossy(&bytes[s..idx]).to_string());
                    if out.len() >= MAX_STRINGS {
                        return out;
                    }
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if bytes.len() - s >= MIN_STRING_LEN {
            out.push(String::from_utf8_lossy(&bytes[s..]).to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_require_minimum_run() {
        let bytes = b"\x00abc\x00hello\x00world!\x01";
        assert_eq!(extract_strings(bytes), vec!["hello".to_string(), "world!".to_string()]);
    }

    #[test]
    fn lfanew_pointing_inside_dos_header_is_ignored() {
        let mut head = vec![0u8; 64];
        head[0] = b'M';
        head[1] = b'Z';
        head[E_LFANEW_OFFSET..E_LFANEW_OFFSET + 4].copy_from_slice(&4u32.to_le_bytes());
        let info = parse_header(&head, 64).unwrap();
        assert_eq!(info, DOS_ONLY);
    }

    #[test]
    fn pe_with_unknown_magic_falls_back_to_dos() {
        let mut head = vec![0u8; 256];
        head[..2].copy_from_slice(b"MZ");
        head[E_LFANEW_OFFSET..E_LFANEW_OFFSET + 4].copy_from_slice(&0x40u32.to_le_bytes());
        head[0x40..0x44].copy_from_slice(b"PE\0\0");
        // magic left as zero
        let info = parse_header(&head, 256).unwrap();
        assert_eq!(info.kind, BinaryKind::Dos);
    }
}
