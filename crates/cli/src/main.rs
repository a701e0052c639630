use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use easy_exe::commands::{
    check_rules_command, history_command, inspect_command, list_environments_command, run_command,
    RunArgs,
};
use easy_exe::{exit_code_for, GlobalOpts, Session};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Launch DOS and Windows executables with per-program environments.
///
/// This CLI is a thin wrapper around `easyexe-core`; all decisions are made
/// in the library.
#[derive(Parser, Debug)]
#[command(
    name = "easy-exe",
    version,
    about = "Launch DOS and Windows executables with the right runtime and settings",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show fingerprint, classification, winning rule and profile for a file.
    Inspect {
        path: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List persistent environments.
    Environments {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show recent launches.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Validate a rule table file.
    CheckRules { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn dispatch(cli: Cli) -> Result<u8> {
    if let Some(Command::CheckRules { file }) = &cli.command {
        check_rules_command(file)?;
        return Ok(0);
    }

    let session = Session::load(&cli.global)?;
    match cli.command {
        Some(Command::Inspect { path, json }) => inspect_command(&session, &path, json)?,
        Some(Command::Environments { json }) => list_environments_command(&session, json)?,
        Some(Command::History { limit, json }) => history_command(&session, limit, json)?,
        Some(Command::CheckRules { .. }) => {}
        None => {
            let path = cli
                .run
                .path
                .clone()
                .ok_or_else(|| anyhow!("no executable given (see --help)"))?;
            return run_command(&session, &cli.run, path);
        }
    }
    Ok(0)
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
