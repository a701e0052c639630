//! Environment manager: one isolated runtime environment per
//! (program hash, runtime) pair, reused across launches.
//!
//! Lookup-or-create runs under an exclusive per-identity file lock, so two
//! concurrent launches of the same program observe exactly one creation.

mod layout;
mod lock;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::RuntimeKind;

pub use layout::{environment_identity, StoreLayout};
pub use lock::IdentityLock;

/// Metadata schema version written by this build.
pub const ENVIRONMENT_SCHEMA_VERSION: u32 = 1;

/// Errors raised while resolving or updating an environment.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Environment {identity} at {}: {source}", .path.display())]
    Io {
        identity: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Environment {identity} at {} is corrupted: {reason}", .path.display())]
    Corrupted { identity: String, path: PathBuf, reason: String },

    #[error(
        "Environment {identity} at {} uses schema version {found}; this build supports up to {supported}",
        .path.display()
    )]
    SchemaIncompatible { identity: String, path: PathBuf, found: u32, supported: u32 },
}

/// Persistent metadata stored as `environment.json` in each environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentMeta {
    pub schema_version: u32,
    pub identity: String,
    pub runtime: RuntimeKind,
    pub program_hash: String,
    pub program_name: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Set while a launch was interrupted; checked on next resolve.
    #[serde(default)]
    pub dirty: bool,
}

/// A resolved environment on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub meta: EnvironmentMeta,
    /// Environment directory (`<store>/<identity>`).
    pub root: PathBuf,
}

impl Environment {
    pub fn identity(&self) -> &str {
        &self.meta.identity
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.meta.runtime
    }

    /// Prefix (Windows layer) or `C:` mount directory (DOS emulator).
    pub fn state_dir(&self) -> PathBuf {
        layout::state_dir_in(&self.root, self.meta.runtime)
    }

    /// Generated DOS emulator config file.
    pub fn dos_config_path(&self) -> PathBuf {
        self.root.join("dosbox.conf")
    }
}

/// What resolving an environment did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    Created,
    Reused,
    Repaired,
}

impl EnvironmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentStatus::Created => "created",
            EnvironmentStatus::Reused => "reused",
            EnvironmentStatus::Repaired => "repaired",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub environment: Environment,
    pub status: EnvironmentStatus,
}

/// Program identity an environment is keyed on.
#[derive(Debug, Clone, Copy)]
pub struct ProgramKey<'a> {
    pub hash: &'a str,
    pub name: &'a str,
}

/// Store of environments rooted at one directory.
#[derive(Debug, Clone)]
pub struct EnvironmentStore {
    layout: StoreLayout,
}

impl EnvironmentStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { layout: StoreLayout::new(root) }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    /// Find or create the environment for `program` under `runtime`.
    ///
    /// With `force_fresh`, any existing environment for the identity is
    /// discarded and a new one is created at the same location.
    pub fn resolve(
        &self,
        program: ProgramKey<'_>,
        runtime: RuntimeKind,
        force_fresh: bool,
    ) -> Result<Resolution, EnvironmentError> {
        let identity = environment_identity(program.hash, runtime);
        let dir = self.layout.environment_dir(&identity);
        let io_err = |source| EnvironmentError::Io {
            identity: identity.clone(),
            path: dir.clone(),
            source,
        };

        fs::create_dir_all(&self.layout.locks_dir).map_err(io_err)?;
        let _lock = IdentityLock::acquire(&self.layout.lock_path(&identity)).map_err(io_err)?;

        if force_fresh && dir.exists() {
            info!(identity = %identity, "discarding environment (fresh requested)");
            fs::remove_dir_all(&dir).map_err(io_err)?;
        }

        let existing = match self.read_meta(&identity)? {
            Some(meta) => meta,
            None => {
                let environment = self.create(&identity, program, runtime)?;
                return Ok(Resolution { environment, status: EnvironmentStatus::Created });
            }
        };

        if existing.schema_version > ENVIRONMENT_SCHEMA_VERSION {
            return Err(EnvironmentError::SchemaIncompatible {
                identity,
                path: dir,
                found: existing.schema_version,
                supported: ENVIRONMENT_SCHEMA_VERSION,
            });
        }
        if existing.schema_version < ENVIRONMENT_SCHEMA_VERSION {
            info!(
                identity = %identity,
                found = existing.schema_version,
                "recreating environment with outdated schema"
            );
            fs::remove_dir_all(&dir).map_err(io_err)?;
            let environment = self.create(&identity, program, runtime)?;
            return Ok(Resolution { environment, status: EnvironmentStatus::Created });
        }
        if existing.identity != identity
            || existing.runtime != runtime
            || !existing.program_hash.eq_ignore_ascii_case(program.hash)
        {
            return Err(EnvironmentError::Corrupted {
                identity,
                path: dir,
                reason: "metadata does not match this program and runtime".to_string(),
            });
        }

        let mut environment = Environment { meta: existing, root: dir.clone() };
        if !environment.meta.dirty {
            fs::create_dir_all(environment.state_dir()).map_err(io_err)?;
            debug!(identity = %identity, "reusing environment");
            return Ok(Resolution { environment, status: EnvironmentStatus::Reused });
        }

        let actions = repair_state(&environment).map_err(io_err)?;
        for action in &actions {
            warn!(identity = %identity, "{action}");
        }
        environment.meta.dirty = false;
        write_meta(&self.layout.metadata_path(&identity), &environment.meta).map_err(io_err)?;
        info!(identity = %identity, repairs = actions.len(), "environment checked after interrupted launch");
        let status =
            if actions.is_empty() { EnvironmentStatus::Reused } else { EnvironmentStatus::Repaired };
        Ok(Resolution { environment, status })
    }

    /// Mark an environment as interrupted so the next resolve checks it.
    pub fn mark_dirty(&self, identity: &str) -> Result<(), EnvironmentError> {
        let dir = self.layout.environment_dir(identity);
        let io_err = |source| EnvironmentError::Io {
            identity: identity.to_string(),
            path: dir.clone(),
            source,
        };
        fs::create_dir_all(&self.layout.locks_dir).map_err(io_err)?;
        let _lock = IdentityLock::acquire(&self.layout.lock_path(identity)).map_err(io_err)?;

        let Some(mut meta) = self.read_meta(identity)? else {
            return Err(EnvironmentError::Corrupted {
                identity: identity.to_string(),
                path: dir,
                reason: "metadata missing".to_string(),
            });
        };
        meta.dirty = true;
        write_meta(&self.layout.metadata_path(identity), &meta).map_err(io_err)?;
        info!(identity = %identity, "environment marked dirty");
        Ok(())
    }

    /// All environments with readable metadata, sorted by identity.
    ///
    /// Directories with unreadable metadata are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Environment>, EnvironmentError> {
        let root = &self.layout.root;
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EnvironmentError::Io {
                    identity: String::new(),
                    path: root.clone(),
                    source,
                })
            }
        };

        let mut out = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let identity = entry.file_name().to_string_lossy().to_string();
            if identity.starts_with('.') {
                continue;
            }
            match self.read_meta(&identity) {
                Ok(Some(meta)) => out.push(Environment { meta, root: path }),
                Ok(None) => {}
                Err(err) => warn!("skipping environment: {err}"),
            }
        }
        out.sort_by(|a, b| a.meta.identity.cmp(&b.meta.identity));
        Ok(out)
    }

    fn read_meta(&self, identity: &str) -> Result<Option<EnvironmentMeta>, EnvironmentError> {
        let path = self.layout.metadata_path(identity);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(EnvironmentError::Io { identity: identity.to_string(), path, source })
            }
        };
        serde_json::from_str(&body).map(Some).map_err(|err| EnvironmentError::Corrupted {
            identity: identity.to_string(),
            path: self.layout.environment_dir(identity),
            reason: format!("unreadable metadata: {err}"),
        })
    }

    fn create(
        &self,
        identity: &str,
        program: ProgramKey<'_>,
        runtime: RuntimeKind,
    ) -> Result<Environment, EnvironmentError> {
        let root = self.layout.environment_dir(identity);
        let io_err = |source| EnvironmentError::Io {
            identity: identity.to_string(),
            path: root.clone(),
            source,
        };

        fs::create_dir_all(self.layout.state_dir(identity, runtime)).map_err(io_err)?;
        let meta = EnvironmentMeta {
            schema_version: ENVIRONMENT_SCHEMA_VERSION,
            identity: identity.to_string(),
            runtime,
            program_hash: program.hash.to_ascii_lowercase(),
            program_name: program.name.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            dirty: false,
        };
        // Metadata last: a directory without it is treated as absent.
        write_meta(&self.layout.metadata_path(identity), &meta).map_err(io_err)?;
        info!(identity = %identity, runtime = %runtime, "created environment");
        Ok(Environment { meta, root })
    }
}

/// Atomically replace the metadata file.
fn write_meta(path: &Path, meta: &EnvironmentMeta) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let body = serde_json::to_string_pretty(meta).map_err(io::Error::other)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(body.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Bring an interrupted environment back to a launchable state.
///
/// Returns a description of every change made; empty when the check passed.
fn repair_state(environment: &Environment) -> io::Result<Vec<String>> {
    let mut actions = Vec::new();
    let state = environment.state_dir();
    if !state.is_dir() {
        fs::create_dir_all(&state)?;
        actions.push(format!("recreated missing state directory {}", state.display()));
    }

    match environment.meta.runtime {
        RuntimeKind::WindowsLayer => {
            // Registry hives truncated by a killed wineserver make the prefix unusable.
            for hive in ["system.reg", "user.reg", "userdef.reg"] {
                let path = state.join(hive);
                if let Ok(meta) = fs::metadata(&path) {
                    if meta.len() == 0 {
                        fs::remove_file(&path)?;
                        actions.push(format!("removed truncated registry hive {hive}"));
                    }
                }
            }
        }
        RuntimeKind::DosEmulator => {
            let conf = environment.dos_config_path();
            if conf.exists() {
                fs::remove_file(&conf)?;
                actions.push("removed stale emulator config".to_string());
            }
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hash: &str) -> ProgramKey<'_> {
        ProgramKey { hash, name: "prog.exe" }
    }

    #[test]
    fn second_resolve_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path());
        let hash = "cd".repeat(32);

        let first = store.resolve(key(&hash), RuntimeKind::WindowsLayer, false).unwrap();
        assert_eq!(first.status, EnvironmentStatus::Created);
        assert!(first.environment.state_dir().is_dir());

        let second = store.resolve(key(&hash), RuntimeKind::WindowsLayer, false).unwrap();
        assert_eq!(second.status, EnvironmentStatus::Reused);
        assert_eq!(first.environment.root, second.environment.root);
        assert_eq!(first.environment.meta.created_at, second.environment.meta.created_at);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path());
        let hash = "ef".repeat(32);
        let resolved = store.resolve(key(&hash), RuntimeKind::DosEmulator, false).unwrap();

        let mut meta = resolved.environment.meta.clone();
        meta.schema_version = ENVIRONMENT_SCHEMA_VERSION + 1;
        write_meta(&store.layout().metadata_path(&meta.identity), &meta).unwrap();

        let err = store.resolve(key(&hash), RuntimeKind::DosEmulator, false).unwrap_err();
        assert!(matches!(err, EnvironmentError::SchemaIncompatible { .. }));
    }

    #[test]
    fn garbage_metadata_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path());
        let hash = "01".repeat(32);
        let resolved = store.resolve(key(&hash), RuntimeKind::DosEmulator, false).unwrap();
        fs::write(store.layout().metadata_path(resolved.environment.identity()), "{not json").unwrap();

        let err = store.resolve(key(&hash), RuntimeKind::DosEmulator, false).unwrap_err();
        assert!(matches!(err, EnvironmentError::Corrupted { .. }));
    }
}
