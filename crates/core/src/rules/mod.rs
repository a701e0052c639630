//! Rule engine: picks exactly one [`ProgramRule`] for a fingerprint.
//!
//! Tiers are tried in a fixed order and the first tier with a match wins:
//! 1. exact content hash,
//! 2. name pattern over the file base name (highest priority, then table order),
//! 3. generic fallback: a table generic rule for the category, or a rule
//!    synthesized from the classification alone.
//!
//! Rules naming a runtime that cannot execute the binary kind are skipped in
//! every tier. Tier 3 always produces a rule, so matching is total.

mod pattern;
mod table;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{BinaryKind, Category, Classification, ExecutableFingerprint, RuntimeKind};

pub use pattern::glob_match;
pub use table::{
    Alternative, MatchRecord, Matcher, ProgramRule, RuleError, RuleRecord, RuleTable,
    RuleTableFile, BUILTIN_RULES_YAML, SUPPORTED_TABLE_VERSION,
};

/// Which tier produced the winning rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Hash,
    Name,
    Generic,
    Synthesized,
}

/// Winning rule plus how it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub tier: MatchTier,
    pub rule: ProgramRule,
}

/// No compatible rule or runtime could be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{runtime} cannot run {kind} executables (selected by {selected_by})")]
    IncompatibleRuntime { runtime: RuntimeKind, kind: BinaryKind, selected_by: String },

    #[error("{runtime} is not available: {detail}")]
    RuntimeUnavailable { runtime: RuntimeKind, detail: String },
}

/// Matches fingerprints against an immutable rule table.
#[derive(Debug, Clone, Copy)]
pub struct RuleEngine<'a> {
    table: &'a RuleTable,
}

impl<'a> RuleEngine<'a> {
    pub fn new(table: &'a RuleTable) -> Self {
        Self { table }
    }

    /// Resolve the single winning rule. Never fails.
    pub fn resolve(
        &self,
        fingerprint: &ExecutableFingerprint,
        classification: &Classification,
    ) -> RuleMatch {
        let found = self
            .match_hash(fingerprint)
            .or_else(|| self.match_name(fingerprint))
            .or_else(|| self.match_generic(fingerprint, classification.category));
        let found = found.unwrap_or_else(|| RuleMatch {
            tier: MatchTier::Synthesized,
            rule: synthesize(fingerprint.kind, classification.category),
        });

        info!(
            rule = %found.rule.name,
            tier = ?found.tier,
            file = %fingerprint.file_name(),
            "matched rule"
        );
        found
    }

    fn match_hash(&self, fingerprint: &ExecutableFingerprint) -> Option<RuleMatch> {
        self.table
            .by_hash(&fingerprint.hash.to_ascii_lowercase())
            .filter(|rule| runs_kind(rule, fingerprint.kind))
            .map(|rule| RuleMatch { tier: MatchTier::Hash, rule: rule.clone() })
    }

    fn match_name(&self, fingerprint: &ExecutableFingerprint) -> Option<RuleMatch> {
        let file_name = fingerprint.file_name();
        let mut best: Option<&ProgramRule> = None;
        for rule in self.table.rules() {
            let Matcher::Name(pattern) = &rule.matcher else { continue };
            if !glob_match(pattern, &file_name) {
                continue;
            }
            if !runs_kind(rule, fingerprint.kind) {
                debug!(rule = %rule.name, kind = %fingerprint.kind, "skipping rule for another binary kind");
                continue;
            }
            debug!(rule = %rule.name, pattern = %pattern, "name pattern matched");
            // Strictly greater keeps the earlier record on equal priority.
            if best.map_or(true, |b| rule.priority > b.priority) {
                best = Some(rule);
            }
        }
        best.map(|rule| RuleMatch { tier: MatchTier::Name, rule: rule.clone() })
    }

    fn match_generic(
        &self,
        fingerprint: &ExecutableFingerprint,
        category: Category,
    ) -> Option<RuleMatch> {
        self.table
            .rules()
            .iter()
            .filter(|rule| rule.matcher == Matcher::Generic(category))
            .find(|rule| runs_kind(rule, fingerprint.kind))
            .map(|rule| RuleMatch { tier: MatchTier::Generic, rule: rule.clone() })
    }
}

/// Whether the rule's runtime (or the kind's default) can execute `kind`.
fn runs_kind(rule: &ProgramRule, kind: BinaryKind) -> bool {
    rule.runtime.unwrap_or_else(|| kind.default_runtime()).supports(kind)
}

/// Fallback rule built from the classification alone.
pub fn synthesize(kind: BinaryKind, category: Category) -> ProgramRule {
    ProgramRule {
        name: format!("generic {} {}", kind.as_str(), category),
        matcher: Matcher::Generic(category),
        priority: 0,
        runtime: Some(kind.default_runtime()),
        category: Some(category),
        overrides: BTreeMap::new(),
        notes: None,
        warning: None,
        alternatives: Vec::new(),
        index: None,
    }
}

/// Pick the runtime for a match, honouring a forced choice, and check that it
/// can execute the binary kind.
pub fn resolve_runtime(
    found: &RuleMatch,
    kind: BinaryKind,
    forced: Option<RuntimeKind>,
) -> Result<RuntimeKind, ResolveError> {
    let (runtime, selected_by) = match (forced, found.rule.runtime) {
        (Some(runtime), _) => (runtime, "--runtime".to_string()),
        (None, Some(runtime)) => (runtime, format!("rule '{}'", found.rule.name)),
        (None, None) => (kind.default_runtime(), "default".to_string()),
    };
    if !runtime.supports(kind) {
        return Err(ResolveError::IncompatibleRuntime { runtime, kind, selected_by });
    }
    Ok(runtime)
}
