use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Exclusive advisory lock on one identity's lock file.
///
/// Held for the duration of a lookup-or-create; dropping the guard releases
/// the lock on every exit path. Locks on different identities use different
/// files and never contend.
///
/// The lock file is never removed, not even with its environment: unlinking
/// it while another process waits on the old inode would let two holders in.
#[derive(Debug)]
pub struct IdentityLock {
    file: File,
    path: PathBuf,
}

impl IdentityLock {
    /// Block until the lock for `path` is held.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).truncate(false).read(true).write(true).open(path)?;
        file.lock()?;
        debug!(lock = %path.display(), "acquired identity lock");
        Ok(Self { file, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IdentityLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(lock = %self.path.display(), "failed to release identity lock: {err}");
        }
    }
}
