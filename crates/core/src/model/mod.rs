//! Core data model shared by every pipeline stage.
//!
//! Values here are plain data: produced by one stage, consumed by the next,
//! never mutated in between.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Broad executable family as determined from the header chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryKind {
    Dos,
    Windows,
}

impl BinaryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryKind::Dos => "dos",
            BinaryKind::Windows => "windows",
        }
    }

    /// Runtime that executes this binary kind when nothing else is specified.
    pub fn default_runtime(self) -> RuntimeKind {
        match self {
            BinaryKind::Dos => RuntimeKind::DosEmulator,
            BinaryKind::Windows => RuntimeKind::WindowsLayer,
        }
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared execution environment from a Windows-style header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemHint {
    Console,
    Graphical,
    Unknown,
}

/// Target CPU recorded in a PE COFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Machine {
    X86,
    X86_64,
    Arm64,
    Other,
}

/// Extended header flavour that was found behind the DOS stub, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedHeader {
    /// `PE\0\0`: 32/64-bit Windows.
    Pe,
    /// `NE`: 16-bit Windows.
    Ne,
    /// `LE`/`LX`: linear executables used by DOS extenders.
    Linear,
}

/// Immutable structural and identity summary of one executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableFingerprint {
    pub path: PathBuf,
    pub kind: BinaryKind,
    pub subsystem: SubsystemHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_header: Option<ExtendedHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<Machine>,
    /// SHA-256 of the full content, lowercase hex.
    pub hash: String,
    pub size: u64,
    /// Imported library and symbol names (Windows binaries only).
    #[serde(default)]
    pub imports: Vec<String>,
    /// Printable strings found in the scanned region.
    #[serde(default, skip_serializing)]
    pub strings: Vec<String>,
    /// Code-pattern markers found in DOS images (see the classifier).
    #[serde(default)]
    pub markers: Vec<String>,
}

impl ExecutableFingerprint {
    /// File base name, used for name-pattern rules and display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Application-vs-game decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Application,
    Game,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Application => "application",
            Category::Game => "game",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "application" | "app" => Ok(Category::Application),
            "game" => Ok(Category::Game),
            other => Err(format!("unknown category '{other}' (expected application or game)")),
        }
    }
}

/// Classification verdict with the evidence that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// Normalised score in `[0, 1]`.
    pub confidence: f64,
    /// True when the tie-break default decided the category.
    pub low_confidence: bool,
    pub evidence: Vec<String>,
}

/// External runtime able to execute a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    DosEmulator,
    WindowsLayer,
}

impl RuntimeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeKind::DosEmulator => "dos-emulator",
            RuntimeKind::WindowsLayer => "windows-layer",
        }
    }

    /// Short prefix used in environment identities.
    pub fn slug(self) -> &'static str {
        match self {
            RuntimeKind::DosEmulator => "dos",
            RuntimeKind::WindowsLayer => "win",
        }
    }

    /// Whether this runtime can execute the given binary kind.
    pub fn supports(self, kind: BinaryKind) -> bool {
        matches!(
            (self, kind),
            (RuntimeKind::DosEmulator, BinaryKind::Dos)
                | (RuntimeKind::WindowsLayer, BinaryKind::Windows)
        )
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dos-emulator" | "dos" | "dosbox" => Ok(RuntimeKind::DosEmulator),
            "windows-layer" | "windows" | "wine" => Ok(RuntimeKind::WindowsLayer),
            other => Err(format!(
                "unknown runtime '{other}' (expected dos-emulator or windows-layer)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_kind_parses_aliases() {
        assert_eq!("wine".parse::<RuntimeKind>().unwrap(), RuntimeKind::WindowsLayer);
        assert_eq!("DOSBox".parse::<RuntimeKind>().unwrap(), RuntimeKind::DosEmulator);
        assert!("qemu".parse::<RuntimeKind>().is_err());
    }

    #[test]
    fn runtime_support_matrix() {
        assert!(RuntimeKind::DosEmulator.supports(BinaryKind::Dos));
        assert!(!RuntimeKind::DosEmulator.supports(BinaryKind::Windows));
        assert!(RuntimeKind::WindowsLayer.supports(BinaryKind::Windows));
        assert!(!RuntimeKind::WindowsLayer.supports(BinaryKind::Dos));
    }
}
