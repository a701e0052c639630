use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use easyexe_core::config::{AppConfig, ConfigError, DataLayout};
use easyexe_core::db::DbError;
use easyexe_core::environment::{EnvironmentError, EnvironmentStore};
use easyexe_core::pipeline::{Pipeline, PipelineError};
use easyexe_core::rules::{ProgramRule, ResolveError, RuleError, RuleTable};
use easyexe_core::services::{LaunchError, SystemProbe};
use easyexe_core::sniff::FormatError;

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Rule table (YAML or JSON) replacing the built-in one.
    #[arg(long, global = true, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Directory holding environments and launch history.
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Config file (defaults to $XDG_CONFIG_HOME/easy-exe/config.yaml).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Resolved configuration for one CLI invocation.
#[derive(Debug, Clone)]
pub struct Session {
    pub config: AppConfig,
    pub config_path: Option<PathBuf>,
    pub data: DataLayout,
    rules_flag: Option<PathBuf>,
}

impl Session {
    pub fn load(opts: &GlobalOpts) -> Result<Self> {
        let (config, config_path) = AppConfig::discover(opts.config.as_deref())?;
        let data_dir = config.data_dir(opts.data_dir.as_deref())?;
        Ok(Self { config, config_path, data: DataLayout::new(data_dir), rules_flag: opts.rules.clone() })
    }

    /// Rule table source: `--rules`, then the config file, then built-in.
    pub fn rules_path(&self) -> Option<&Path> {
        self.rules_flag.as_deref().or(self.config.rules.as_deref())
    }

    pub fn rule_table(&self) -> Result<RuleTable> {
        match self.rules_path() {
            Some(path) => RuleTable::load(path)
                .with_context(|| format!("Failed to load rule table {}", path.display())),
            None => RuleTable::builtin().context("Built-in rule table is invalid"),
        }
    }

    pub fn store(&self) -> EnvironmentStore {
        EnvironmentStore::new(&self.data.environments_dir)
    }

    pub fn probe(&self) -> SystemProbe {
        SystemProbe::new(self.config.runtimes.wine.clone(), self.config.runtimes.dosbox.clone())
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        let rules = Arc::new(self.rule_table()?);
        Ok(Pipeline::new(rules, self.store(), Arc::new(self.probe()))
            .with_history(&self.data.history_db))
    }
}

/// Absolute form of `path`: canonicalized when it exists, otherwise joined
/// onto the current directory.
pub fn canonicalize_or_current(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(p) => Ok(p),
        Err(_) if path.is_absolute() => Ok(path.to_path_buf()),
        Err(_) => {
            let cwd = env::current_dir().context("Failed to get current directory")?;
            Ok(cwd.join(path))
        }
    }
}

/// Print a rule's warning and suggested alternatives to stderr.
pub fn print_notices(rule: &ProgramRule) {
    if let Some(warning) = &rule.warning {
        eprintln!("warning: {}: {warning}", rule.name);
    }
    if !rule.alternatives.is_empty() {
        eprintln!("note: native alternatives to {}:", rule.name);
        for alt in &rule.alternatives {
            match &alt.description {
                Some(description) => eprintln!("  - {} ({description})", alt.name),
                None => eprintln!("  - {}", alt.name),
            }
        }
    }
}

/// Process exit status for an error, from the first typed cause in its chain.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PipelineError>() {
            return e.exit_code();
        }
        if cause.is::<FormatError>() {
            return 1;
        }
        if cause.is::<RuleError>() || cause.is::<ResolveError>() {
            return 2;
        }
        if cause.is::<EnvironmentError>() || cause.is::<ConfigError>() || cause.is::<DbError>() {
            return 3;
        }
        if cause.is::<LaunchError>() {
            return 4;
        }
    }
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_errors_map_to_two() {
        let err = anyhow::Error::new(RuleError::UnsupportedVersion { found: 9, expected: 1 })
            .context("Failed to load rule table x.yaml");
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn untyped_errors_map_to_three() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), 3);
    }
}
