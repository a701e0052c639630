use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::environment::EnvironmentStore;
use crate::services::plan::LaunchPlan;

/// Time a cancelled runtime gets to exit after SIGTERM before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Whether the caller waits for the runtime to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Wait,
    Detached,
}

impl LaunchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchMode::Wait => "wait",
            LaunchMode::Detached => "detached",
        }
    }
}

impl FromStr for LaunchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wait" => Ok(LaunchMode::Wait),
            "detached" | "detach" => Ok(LaunchMode::Detached),
            other => Err(format!("unknown launch mode '{other}' (expected wait or detached)")),
        }
    }
}

/// Shared flag observed by a waiting launch.
#[derive(Debug, Clone)]
pub struct CancelToken(Flag);

#[derive(Debug, Clone)]
enum Flag {
    Shared(Arc<AtomicBool>),
    Static(&'static AtomicBool),
}

impl Default for CancelToken {
    fn default() -> Self {
        Self(Flag::Shared(Arc::new(AtomicBool::new(false))))
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token backed by a process-wide flag, e.g. one set from a signal handler.
    pub fn from_static(flag: &'static AtomicBool) -> Self {
        Self(Flag::Static(flag))
    }

    fn flag(&self) -> &AtomicBool {
        match &self.0 {
            Flag::Shared(flag) => flag,
            Flag::Static(flag) => flag,
        }
    }

    pub fn cancel(&self) {
        self.flag().store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag().load(Ordering::SeqCst)
    }
}

/// How a launch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LaunchOutcome {
    Exited { code: i32 },
    Cancelled,
    Detached { pid: u32 },
}

impl LaunchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchOutcome::Exited { .. } => "exited",
            LaunchOutcome::Cancelled => "cancelled",
            LaunchOutcome::Detached { .. } => "detached",
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            LaunchOutcome::Exited { code } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Runtime binary {} not found: {source}", .program.display())]
    RuntimeUnavailable {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to spawn {}: {source}", .program.display())]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed while waiting for the runtime: {0}")]
    Wait(#[source] io::Error),
}

/// Spawns runtimes from launch plans.
#[derive(Debug, Clone)]
pub struct Launcher<'a> {
    store: &'a EnvironmentStore,
    grace: Duration,
}

impl<'a> Launcher<'a> {
    pub fn new(store: &'a EnvironmentStore) -> Self {
        Self { store, grace: DEFAULT_GRACE_PERIOD }
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Write the plan's files, spawn the runtime and, in `Wait` mode, block
    /// until it exits or `cancel` fires.
    ///
    /// A cancelled or signal-terminated launch marks its environment dirty.
    pub fn launch(
        &self,
        plan: &LaunchPlan,
        mode: LaunchMode,
        cancel: &CancelToken,
    ) -> Result<LaunchOutcome, LaunchError> {
        for file in &plan.files {
            if let Some(parent) = file.path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|source| LaunchError::WriteFile { path: file.path.clone(), source })?;
            }
            fs::write(&file.path, &file.contents)
                .map_err(|source| LaunchError::WriteFile { path: file.path.clone(), source })?;
        }

        let mut command = Command::new(&plan.program);
        command.args(&plan.args).envs(&plan.env).current_dir(&plan.working_dir);
        if mode == LaunchMode::Detached {
            command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
            #[cfg(unix)]
            {
                use std::os::unix::process::CommandExt;
                // Own process group: a later Ctrl-C in this terminal must not reach it.
                command.process_group(0);
            }
        }

        let mut child = command.spawn().map_err(|source| {
            let program = plan.program.clone();
            if source.kind() == io::ErrorKind::NotFound {
                LaunchError::RuntimeUnavailable { program, source }
            } else {
                LaunchError::SpawnFailed { program, source }
            }
        })?;
        let pid = child.id();
        info!(pid, runtime = %plan.runtime, identity = %plan.environment_identity, mode = mode.as_str(), "runtime started");

        if mode == LaunchMode::Detached {
            return Ok(LaunchOutcome::Detached { pid });
        }

        let outcome = self.wait(&mut child, cancel)?;
        match outcome {
            WaitResult::Exited(status) => {
                let code = exit_code(status);
                if terminated_by_signal(status) {
                    self.mark_dirty(&plan.environment_identity);
                }
                info!(pid, code, "runtime exited");
                Ok(LaunchOutcome::Exited { code })
            }
            WaitResult::Cancelled => {
                self.mark_dirty(&plan.environment_identity);
                info!(pid, "launch cancelled");
                Ok(LaunchOutcome::Cancelled)
            }
        }
    }

    fn wait(&self, child: &mut Child, cancel: &CancelToken) -> Result<WaitResult, LaunchError> {
        loop {
            if let Some(status) = child.try_wait().map_err(LaunchError::Wait)? {
                // The child may have died from the same Ctrl-C that set the token.
                if cancel.is_cancelled() {
                    return Ok(WaitResult::Cancelled);
                }
                return Ok(WaitResult::Exited(status));
            }
            if cancel.is_cancelled() {
                self.terminate(child)?;
                return Ok(WaitResult::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// SIGTERM, wait up to the grace period, then kill.
    fn terminate(&self, child: &mut Child) -> Result<(), LaunchError> {
        request_stop(child);
        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            if child.try_wait().map_err(LaunchError::Wait)?.is_some() {
                debug!("runtime stopped within grace period");
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        warn!(pid = child.id(), "runtime ignored termination request; killing");
        if let Err(err) = child.kill() {
            // Already exited between the last poll and the kill.
            if err.kind() != io::ErrorKind::InvalidInput {
                return Err(LaunchError::Wait(err));
            }
        }
        child.wait().map_err(LaunchError::Wait)?;
        Ok(())
    }

    fn mark_dirty(&self, identity: &str) {
        if let Err(err) = self.store.mark_dirty(identity) {
            warn!("could not mark environment dirty: {err}");
        }
    }
}

enum WaitResult {
    Exited(ExitStatus),
    Cancelled,
}

#[cfg(unix)]
fn request_stop(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else { return };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!("SIGTERM failed: {err}");
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|sig| 128 + sig)).unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(unix)]
fn terminated_by_signal(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
fn terminated_by_signal(_status: ExitStatus) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn launch_mode_parses() {
        assert_eq!("detach".parse::<LaunchMode>().unwrap(), LaunchMode::Detached);
        assert_eq!("WAIT".parse::<LaunchMode>().unwrap(), LaunchMode::Wait);
        assert!("later".parse::<LaunchMode>().is_err());
    }
}
