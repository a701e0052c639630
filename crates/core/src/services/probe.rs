use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::RuntimeKind;

/// Oldest Windows-layer major version accepted.
pub const MIN_WINE_MAJOR: u32 = 5;

/// Environment variable overriding the Windows-layer binary.
pub const WINE_BIN_ENV: &str = "EASYEXE_WINE_BIN";
/// Environment variable overriding the DOS emulator binary.
pub const DOSBOX_BIN_ENV: &str = "EASYEXE_DOSBOX_BIN";

/// Result of probing the host for a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available { path: PathBuf, version: String },
    Unavailable { reason: String },
    VersionIncompatible { path: PathBuf, found: String, required: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }

    /// Human-readable reason when the runtime cannot be used.
    pub fn detail(&self) -> String {
        match self {
            Availability::Available { path, version } => {
                format!("{version} at {}", path.display())
            }
            Availability::Unavailable { reason } => reason.clone(),
            Availability::VersionIncompatible { path, found, required } => {
                format!("{} reports version {found}; {required} is required", path.display())
            }
        }
    }
}

/// Locates external runtimes on the host.
pub trait RuntimeProbe: Send + Sync {
    fn probe(&self, runtime: RuntimeKind) -> Availability;
}

/// Probe backed by the real filesystem and `PATH`.
///
/// Lookup order: configured path, environment override, then `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    pub wine_path: Option<PathBuf>,
    pub dosbox_path: Option<PathBuf>,
}

impl SystemProbe {
    pub fn new(wine_path: Option<PathBuf>, dosbox_path: Option<PathBuf>) -> Self {
        Self { wine_path, dosbox_path }
    }

    /// Where the runtime binary would be taken from, without running it.
    pub fn locate(&self, runtime: RuntimeKind) -> Option<PathBuf> {
        let (configured, env_key, names): (&Option<PathBuf>, &str, &[&str]) = match runtime {
            RuntimeKind::WindowsLayer => (&self.wine_path, WINE_BIN_ENV, &["wine", "wine64"]),
            RuntimeKind::DosEmulator => {
                (&self.dosbox_path, DOSBOX_BIN_ENV, &["dosbox", "dosbox-x", "dosbox-staging"])
            }
        };
        if let Some(path) = configured {
            return Some(path.clone());
        }
        if let Some(path) = env::var_os(env_key).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(path));
        }
        names.iter().find_map(|name| find_in_path(name))
    }
}

impl RuntimeProbe for SystemProbe {
    fn probe(&self, runtime: RuntimeKind) -> Availability {
        let Some(path) = self.locate(runtime) else {
            return Availability::Unavailable {
                reason: format!("no {runtime} binary found on PATH"),
            };
        };
        if !path.is_file() {
            return Availability::Unavailable {
                reason: format!("{} does not exist", path.display()),
            };
        }
        let Some(version) = detect_version(&path) else {
            return Availability::Unavailable {
                reason: format!("{} --version failed", path.display()),
            };
        };
        debug!(runtime = %runtime, path = %path.display(), version = %version, "probed runtime");

        if runtime == RuntimeKind::WindowsLayer {
            match parse_major_version(&version) {
                Some(major) if major >= MIN_WINE_MAJOR => {}
                _ => {
                    return Availability::VersionIncompatible {
                        path,
                        found: version,
                        required: format!(">= {MIN_WINE_MAJOR}.0"),
                    }
                }
            }
        }
        Availability::Available { path, version }
    }
}

/// First executable named `executable` on `PATH`.
pub fn find_in_path(executable: &str) -> Option<PathBuf> {
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|p| {
            let candidate = p.join(executable);
            if candidate.is_file() {
                Some(candidate)
            } else {
                None
            }
        })
    })
}

fn detect_version(path: &Path) -> Option<String> {
    Command::new(path).arg("--version").output().ok().and_then(|out| {
        // Some DOSBox builds print the banner on stderr.
        let text = if out.stdout.is_empty() { out.stderr } else { out.stdout };
        let line = String::from_utf8_lossy(&text).lines().next().unwrap_or("").trim().to_string();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    })
}

/// Leading major version in outputs like `wine-8.0.2 (Staging)` or
/// `DOSBox version 0.74-3`.
pub fn parse_major_version(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_versions() {
        assert_eq!(parse_major_version("wine-8.0.2 (Staging)"), Some(8));
        assert_eq!(parse_major_version("wine-10.3"), Some(10));
        assert_eq!(parse_major_version("DOSBox version 0.74-3"), Some(0));
        assert_eq!(parse_major_version("wine"), None);
    }

    #[test]
    fn configured_path_wins() {
        let probe = SystemProbe::new(Some(PathBuf::from("/opt/wine/bin/wine")), None);
        assert_eq!(
            probe.locate(RuntimeKind::WindowsLayer),
            Some(PathBuf::from("/opt/wine/bin/wine"))
        );
    }

    #[test]
    fn missing_configured_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let probe = SystemProbe::new(None, Some(dir.path().join("nope")));
        assert!(matches!(
            probe.probe(RuntimeKind::DosEmulator),
            Availability::Unavailable { .. }
        ));
    }
}
