//! One forward pass per invocation:
//! `Fingerprinted -> Classified -> Matched -> Configured -> Environed -> Launched`.
//!
//! Each step consumes only the previous step's output. Any failure ends the
//! pass in `Failed`, carrying the step that failed and the typed cause.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::classify::classify;
use crate::db::{HistoryDb, LaunchRecord};
use crate::environment::{
    environment_identity, EnvironmentError, EnvironmentStore, ProgramKey, Resolution,
};
use crate::model::{Classification, ExecutableFingerprint, RuntimeKind};
use crate::profile::{self, RuntimeProfile};
use crate::rules::{resolve_runtime, ResolveError, RuleEngine, RuleMatch, RuleTable};
use crate::services::launcher::{
    CancelToken, LaunchError, LaunchMode, LaunchOutcome, Launcher, DEFAULT_GRACE_PERIOD,
};
use crate::services::plan::{build_plan, LaunchPlan};
use crate::services::probe::{Availability, RuntimeProbe};
use crate::sniff::{sniff_path, FormatError};

/// States of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fingerprinted,
    Classified,
    Matched,
    Configured,
    Environed,
    Launched,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fingerprinted => "fingerprinted",
            Stage::Classified => "classified",
            Stage::Matched => "matched",
            Stage::Configured => "configured",
            Stage::Environed => "environed",
            Stage::Launched => "launched",
            Stage::Failed => "failed",
        }
    }

    /// Component responsible for reaching this stage.
    pub fn component(self) -> &'static str {
        match self {
            Stage::Fingerprinted => "sniffer",
            Stage::Classified => "classifier",
            Stage::Matched => "rule engine",
            Stage::Configured => "config synthesizer",
            Stage::Environed => "environment manager",
            Stage::Launched => "launcher",
            Stage::Failed => "pipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineErrorKind {
    #[error("FormatError: {0}")]
    Format(#[from] FormatError),

    #[error("ResolveError: {0}")]
    Resolve(#[from] ResolveError),

    #[error("EnvironmentError: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("LaunchError: {0}")]
    Launch(#[from] LaunchError),
}

/// Failure of one invocation: which stage could not be reached, why, and
/// for which input.
#[derive(Debug, Error)]
#[error("{} failed for {}: {kind}", .stage.component(), .input.display())]
pub struct PipelineError {
    /// Stage that was being attempted.
    pub stage: Stage,
    pub input: PathBuf,
    #[source]
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    fn new(stage: Stage, input: &Path, kind: impl Into<PipelineErrorKind>) -> Self {
        Self { stage, input: input.to_path_buf(), kind: kind.into() }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self.kind {
            PipelineErrorKind::Format(_) => 1,
            PipelineErrorKind::Resolve(_) => 2,
            PipelineErrorKind::Environment(_) => 3,
            PipelineErrorKind::Launch(_) => 4,
        }
    }
}

/// Per-invocation switches.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Stop after configuration; nothing is created or spawned.
    pub dry_run: bool,
    /// Use this runtime regardless of rule or binary kind default.
    pub forced_runtime: Option<RuntimeKind>,
    pub force_fresh_environment: bool,
    pub mode: LaunchMode,
}

/// Everything decided before any side effect.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub fingerprint: ExecutableFingerprint,
    pub classification: Classification,
    #[serde(rename = "rule")]
    pub rule_match: RuleMatch,
    pub runtime: RuntimeKind,
    pub profile: RuntimeProfile,
    pub environment_identity: String,
    pub availability: Availability,
    pub plan: LaunchPlan,
}

/// Result of a completed invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub decision: Decision,
    /// Last stage reached.
    pub stage: Stage,
    pub environment: Option<Resolution>,
    pub outcome: Option<LaunchOutcome>,
}

/// The decision pipeline, shared across invocations.
#[derive(Clone)]
pub struct Pipeline {
    rules: Arc<RuleTable>,
    store: EnvironmentStore,
    probe: Arc<dyn RuntimeProbe>,
    history: Option<PathBuf>,
    grace: Duration,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("rules", &self.rules.len())
            .field("store", &self.store.root())
            .field("history", &self.history)
            .finish()
    }
}

impl Pipeline {
    pub fn new(rules: Arc<RuleTable>, store: EnvironmentStore, probe: Arc<dyn RuntimeProbe>) -> Self {
        Self { rules, store, probe, history: None, grace: DEFAULT_GRACE_PERIOD }
    }

    /// Record launches in the history database at `path`.
    pub fn with_history(mut self, path: impl Into<PathBuf>) -> Self {
        self.history = Some(path.into());
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn store(&self) -> &EnvironmentStore {
        &self.store
    }

    /// Run through configuration without touching the environment store or
    /// spawning anything.
    pub fn plan(&self, path: &Path, options: &PipelineOptions) -> Result<Decision, PipelineError> {
        let fingerprint =
            sniff_path(path).map_err(|e| PipelineError::new(Stage::Fingerprinted, path, e))?;
        let classification = classify(&fingerprint);
        let rule_match = RuleEngine::new(&self.rules).resolve(&fingerprint, &classification);
        let runtime = resolve_runtime(&rule_match, fingerprint.kind, options.forced_runtime)
            .map_err(|e| PipelineError::new(Stage::Matched, path, e))?;
        let profile = profile::synthesize(&classification, &rule_match.rule, runtime);

        let identity = environment_identity(&fingerprint.hash, runtime);
        let availability = self.probe.probe(runtime);
        let runtime_bin = match &availability {
            Availability::Available { path, .. } | Availability::VersionIncompatible { path, .. } => {
                path.clone()
            }
            Availability::Unavailable { .. } => PathBuf::from(default_command(runtime)),
        };
        let plan = build_plan(&fingerprint, &profile, &runtime_bin, self.store.layout(), &identity);

        info!(
            file = %fingerprint.file_name(),
            kind = %fingerprint.kind,
            category = %profile.category,
            runtime = %runtime,
            rule = %rule_match.rule.name,
            "configured"
        );
        Ok(Decision {
            fingerprint,
            classification,
            rule_match,
            runtime,
            profile,
            environment_identity: identity,
            availability,
            plan,
        })
    }

    /// Full pass: plan, then (unless dry-run) environment and launch.
    pub fn run(
        &self,
        path: &Path,
        options: &PipelineOptions,
        cancel: &CancelToken,
    ) -> Result<RunReport, PipelineError> {
        let decision = self.plan(path, options)?;
        self.execute(decision, options, cancel)
    }

    /// Continue a pass from a decision produced by [`Pipeline::plan`].
    pub fn execute(
        &self,
        decision: Decision,
        options: &PipelineOptions,
        cancel: &CancelToken,
    ) -> Result<RunReport, PipelineError> {
        let input = decision.fingerprint.path.clone();
        let path = input.as_path();
        if options.dry_run {
            return Ok(RunReport {
                decision,
                stage: Stage::Configured,
                environment: None,
                outcome: None,
            });
        }

        if !decision.availability.is_available() {
            let err = ResolveError::RuntimeUnavailable {
                runtime: decision.runtime,
                detail: decision.availability.detail(),
            };
            return Err(PipelineError::new(Stage::Matched, path, err));
        }

        let program_name = decision.fingerprint.file_name();
        let key = ProgramKey { hash: &decision.fingerprint.hash, name: &program_name };
        let resolution = self
            .store
            .resolve(key, decision.runtime, options.force_fresh_environment)
            .map_err(|e| PipelineError::new(Stage::Environed, path, e))?;
        info!(
            identity = %resolution.environment.identity(),
            status = resolution.status.as_str(),
            "environment ready"
        );

        let started_at = chrono::Utc::now().to_rfc3339();
        let launcher = Launcher::new(&self.store).with_grace_period(self.grace);
        let launched = launcher.launch(&decision.plan, options.mode, cancel);
        self.record(&decision, options.mode, started_at, launched.as_ref().ok());

        let outcome = launched.map_err(|e| PipelineError::new(Stage::Launched, path, e))?;
        if let LaunchOutcome::Exited { code } = outcome {
            if code != 0 {
                warn!(code, "program exited with non-zero status");
            }
        }
        Ok(RunReport {
            decision,
            stage: Stage::Launched,
            environment: Some(resolution),
            outcome: Some(outcome),
        })
    }

    /// Best effort: history failures never fail a launch.
    fn record(
        &self,
        decision: &Decision,
        mode: LaunchMode,
        started_at: String,
        outcome: Option<&LaunchOutcome>,
    ) {
        let Some(db_path) = &self.history else { return };
        let finished_at = match outcome {
            Some(LaunchOutcome::Detached { .. }) => None,
            _ => Some(chrono::Utc::now().to_rfc3339()),
        };
        let record = LaunchRecord {
            id: None,
            identity: decision.environment_identity.clone(),
            program_name: decision.fingerprint.file_name(),
            program_hash: decision.fingerprint.hash.clone(),
            runtime: decision.runtime.as_str().to_string(),
            rule: decision.rule_match.rule.name.clone(),
            mode: mode.as_str().to_string(),
            started_at,
            finished_at,
            outcome: outcome.map_or("failed", LaunchOutcome::as_str).to_string(),
            exit_code: outcome.and_then(LaunchOutcome::exit_code),
        };
        let result = HistoryDb::open(db_path).and_then(|db| db.insert_launch(&record));
        if let Err(err) = result {
            warn!(db = %db_path.display(), "failed to record launch history: {err}");
        }
    }
}

/// Command name used in plans when the runtime could not be located.
pub fn default_command(runtime: RuntimeKind) -> &'static str {
    match runtime {
        RuntimeKind::WindowsLayer => "wine",
        RuntimeKind::DosEmulator => "dosbox",
    }
}
