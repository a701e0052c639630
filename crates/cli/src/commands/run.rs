use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Args;
use easyexe_core::environment::EnvironmentStatus;
use easyexe_core::model::RuntimeKind;
use easyexe_core::pipeline::{Decision, PipelineOptions};
use easyexe_core::services::{CancelToken, LaunchMode, LaunchOutcome};
use serde::Serialize;

use crate::commands::util::{canonicalize_or_current, print_notices, Session};

/// Set by SIGINT/SIGTERM while a launch is being waited on.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Exit status reported when the user cancels a waiting launch.
pub const CANCELLED_EXIT_CODE: u8 = 130;

/// Arguments of the default (launch) command.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Executable to launch.
    pub path: Option<PathBuf>,

    /// Decide everything and print the launch plan without running it.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Force a runtime (dos-emulator or windows-layer).
    #[arg(long, value_name = "KIND")]
    pub runtime: Option<RuntimeKind>,

    /// Discard any existing environment for this program first.
    #[arg(long, default_value_t = false)]
    pub force_fresh_environment: bool,

    /// Return right after the runtime starts instead of waiting for it.
    #[arg(long, default_value_t = false)]
    pub detach: bool,

    /// Emit JSON instead of human-readable text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    program: String,
    rule: &'a str,
    runtime: RuntimeKind,
    environment: &'a str,
    environment_status: Option<EnvironmentStatus>,
    #[serde(flatten)]
    outcome: Option<LaunchOutcome>,
}

/// Run the full pipeline for `args.path`; returns the process exit status.
pub fn run_command(session: &Session, args: &RunArgs, path: PathBuf) -> Result<u8> {
    let pipeline = session.pipeline()?;
    let target = canonicalize_or_current(&path)?;
    let mode = if args.detach {
        LaunchMode::Detached
    } else {
        session.config.launch_mode.unwrap_or_default()
    };
    let options = PipelineOptions {
        dry_run: args.dry_run,
        forced_runtime: args.runtime,
        force_fresh_environment: args.force_fresh_environment,
        mode,
    };

    let decision = pipeline.plan(&target, &options)?;
    print_notices(&decision.rule_match.rule);

    if args.dry_run {
        print_decision(&decision, args.json)?;
        return Ok(0);
    }

    let cancel = if mode == LaunchMode::Wait {
        install_interrupt_handler();
        CancelToken::from_static(&INTERRUPTED)
    } else {
        CancelToken::new()
    };

    let report = pipeline.execute(decision, &options, &cancel)?;
    let summary = RunSummary {
        program: report.decision.fingerprint.file_name(),
        rule: &report.decision.rule_match.rule.name,
        runtime: report.decision.runtime,
        environment: &report.decision.environment_identity,
        environment_status: report.environment.as_ref().map(|r| r.status),
        outcome: report.outcome,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    let code = match report.outcome {
        Some(LaunchOutcome::Exited { code }) => {
            if !args.json && code != 0 {
                eprintln!("{} exited with status {code}", summary.program);
            }
            u8::try_from(code).unwrap_or(1)
        }
        Some(LaunchOutcome::Cancelled) => {
            if !args.json {
                eprintln!("Launch cancelled; environment {} will be checked on next use.", summary.environment);
            }
            CANCELLED_EXIT_CODE
        }
        Some(LaunchOutcome::Detached { pid }) => {
            if !args.json {
                println!("Started {} under {} (pid {pid}).", summary.program, summary.runtime);
            }
            0
        }
        None => 0,
    };
    Ok(code)
}

/// Print the decision and plan without side effects.
pub fn print_decision(decision: &Decision, json: bool) -> Result<()> {
    if json {
        let body = serde_json::to_string_pretty(decision).context("Failed to serialize plan")?;
        println!("{body}");
        return Ok(());
    }

    let fp = &decision.fingerprint;
    println!("Program:  {} ({})", fp.file_name(), fp.kind);
    println!("Hash:     {}", fp.hash);
    println!(
        "Category: {} (confidence {:.2}{})",
        decision.profile.category,
        decision.classification.confidence,
        if decision.classification.low_confidence { ", default" } else { "" }
    );
    println!("Rule:     {} [{:?}]", decision.rule_match.rule.name, decision.rule_match.tier);
    println!("Runtime:  {} ({})", decision.runtime, decision.availability.detail());
    println!("Profile:");
    for (key, value) in &decision.profile.config {
        println!("  {key} = {value}");
    }
    println!("Plan:");
    for line in decision.plan.to_string().lines() {
        println!("  {line}");
    }
    Ok(())
}

#[cfg(unix)]
fn install_interrupt_handler() {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use std::sync::atomic::Ordering;

    extern "C" fn on_signal(_signal: std::ffi::c_int) {
        // Only an atomic store is async-signal-safe here.
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::SA_RESTART, SigSet::empty());
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler performs a single atomic store.
        if let Err(err) = unsafe { signal::sigaction(sig, &action) } {
            tracing::warn!("failed to install {sig} handler: {err}");
        }
    }
}

#[cfg(not(unix))]
fn install_interrupt_handler() {}
