use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::model::RuntimeKind;

/// Logical layout of the environment store on disk.
///
/// This is derived from a chosen root path. It does *not* touch the
/// filesystem; [`super::EnvironmentStore`] creates what it needs.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    /// Root directory holding one subdirectory per identity.
    pub root: PathBuf,
    /// Directory holding per-identity lock files.
    pub locks_dir: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let locks_dir = root.join(".locks");
        Self { root, locks_dir }
    }

    /// Directory for one environment.
    pub fn environment_dir(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }

    /// Metadata record inside an environment directory.
    pub fn metadata_path(&self, identity: &str) -> PathBuf {
        self.environment_dir(identity).join("environment.json")
    }

    pub fn lock_path(&self, identity: &str) -> PathBuf {
        self.locks_dir.join(format!("{identity}.lock"))
    }

    /// Runtime state directory: the Windows-layer prefix or the DOS `C:` mount.
    pub fn state_dir(&self, identity: &str, runtime: RuntimeKind) -> PathBuf {
        state_dir_in(&self.environment_dir(identity), runtime)
    }
}

pub(crate) fn state_dir_in(environment_dir: &Path, runtime: RuntimeKind) -> PathBuf {
    match runtime {
        RuntimeKind::WindowsLayer => environment_dir.join("prefix"),
        RuntimeKind::DosEmulator => environment_dir.join("drive_c"),
    }
}

/// Stable identity for a program + runtime pair.
///
/// A pure function of its inputs: `<runtime-slug>-<16 hex chars>`.
pub fn environment_identity(program_hash: &str, runtime: RuntimeKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(program_hash.to_ascii_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(runtime.as_str().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", runtime.slug(), &digest[..16])
}
