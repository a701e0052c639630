use std::path::Path;

use anyhow::{Context, Result};
use easyexe_core::rules::{Matcher, RuleTable};

/// Validate a rule table file and summarise it.
pub fn check_rules_command(path: &Path) -> Result<()> {
    let table = RuleTable::load(path)
        .with_context(|| format!("Failed to load rule table {}", path.display()))?;

    let (mut hash, mut name, mut generic) = (0, 0, 0);
    for rule in table.rules() {
        match rule.matcher {
            Matcher::Hash(_) => hash += 1,
            Matcher::Name(_) => name += 1,
            Matcher::Generic(_) => generic += 1,
        }
    }
    println!(
        "{}: OK ({} rules: {hash} hash, {name} name, {generic} generic)",
        path.display(),
        table.len()
    );
    Ok(())
}
