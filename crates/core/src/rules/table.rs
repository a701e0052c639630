//! Rule table records, loading, and load-time validation.
//!
//! The table is an external, human-editable YAML or JSON document:
//!
//! ```yaml
//! version: 1
//! rules:
//!   - name: WinRAR
//!     match: { name: "winrar*.exe" }
//!     priority: 10
//!     runtime: windows-layer
//!     category: application
//!     overrides:
//!       wine.dll_overrides: "winemenubuilder.exe=d"
//! ```
//!
//! Every record is validated before the table is handed out; the first bad
//! record aborts the load with its index and name.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Category, RuntimeKind};
use crate::services::plan::RESERVED_ENV;

/// Table format versions this crate can read.
pub const SUPPORTED_TABLE_VERSION: u32 = 1;

/// Built-in table used when no external table is configured.
pub const BUILTIN_RULES_YAML: &str = include_str!("builtin_rules.yaml");

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to read rule table {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("Failed to parse rule table: {0}")]
    Parse(String),

    #[error("Unsupported rule table version {found}; expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Invalid rule #{index} ({name}): {reason}")]
    InvalidRecord { index: usize, name: String, reason: String },

    /// Two records claim the same matcher. The table is defective.
    #[error("Rule conflict: #{first} ({first_name}) and #{second} ({second_name}) both match {matcher}")]
    RuleConflict {
        first: usize,
        first_name: String,
        second: usize,
        second_name: String,
        matcher: String,
    },
}

/// How a rule selects programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Exact SHA-256 content hash (lowercase hex).
    Hash(String),
    /// Case-insensitive glob over the file base name.
    Name(String),
    /// Category-wide fallback.
    Generic(Category),
}

impl Matcher {
    pub fn describe(&self) -> String {
        match self {
            Matcher::Hash(h) => format!("hash {h}"),
            Matcher::Name(p) => format!("name pattern '{p}'"),
            Matcher::Generic(c) => format!("generic {c}"),
        }
    }
}

/// Linux-native program suggested instead of running the Windows one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternative {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Validated rule as used by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRule {
    pub name: String,
    pub matcher: Matcher,
    pub priority: i32,
    /// `None` means the runtime default for the binary kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Alternative>,
    /// Position in the source table; `None` for synthesized fallbacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ProgramRule {
    pub fn is_synthesized(&self) -> bool {
        self.index.is_none()
    }
}

/// On-disk shape of a rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleTableFile {
    pub version: u32,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
}

/// On-disk shape of a single record, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleRecord {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "match")]
    pub matcher: MatchRecord,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchRecord {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub generic: Option<String>,
}

/// Immutable, validated rule table. Share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<ProgramRule>,
    by_hash: HashMap<String, usize>,
}

impl RuleTable {
    /// Load a table from disk; `.json` files are parsed as JSON, everything
    /// else as YAML.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let body = fs::read_to_string(path)
            .map_err(|source| RuleError::Io { path: path.display().to_string(), source })?;
        let is_json = path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("json"));
        if is_json == Some(true) {
            Self::from_json_str(&body)
        } else {
            Self::from_yaml_str(&body)
        }
    }

    pub fn builtin() -> Result<Self, RuleError> {
        Self::from_yaml_str(BUILTIN_RULES_YAML)
    }

    pub fn from_yaml_str(body: &str) -> Result<Self, RuleError> {
        let file: RuleTableFile =
            serde_yaml::from_str(body).map_err(|e| RuleError::Parse(e.to_string()))?;
        Self::from_file(file)
    }

    pub fn from_json_str(body: &str) -> Result<Self, RuleError> {
        let file: RuleTableFile =
            serde_json::from_str(body).map_err(|e| RuleError::Parse(e.to_string()))?;
        Self::from_file(file)
    }

    pub fn from_file(file: RuleTableFile) -> Result<Self, RuleError> {
        if file.version != SUPPORTED_TABLE_VERSION {
            return Err(RuleError::UnsupportedVersion {
                found: file.version,
                expected: SUPPORTED_TABLE_VERSION,
            });
        }
        let rules = file
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, record)| validate_record(index, record))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_rules(rules)
    }

    /// Build a table from already-validated rules, checking for conflicts.
    pub fn from_rules(rules: Vec<ProgramRule>) -> Result<Self, RuleError> {
        let by_hash = check_conflicts(&rules)?;
        Ok(Self { rules, by_hash })
    }

    pub fn rules(&self) -> &[ProgramRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn by_hash(&self, hash: &str) -> Option<&ProgramRule> {
        self.by_hash.get(hash).map(|&i| &self.rules[i])
    }
}

fn validate_record(index: usize, record: RuleRecord) -> Result<ProgramRule, RuleError> {
    let name = record.name.trim().to_string();
    let invalid = |reason: String| RuleError::InvalidRecord {
        index,
        name: if name.is_empty() { "<unnamed>".to_string() } else { name.clone() },
        reason,
    };
    if name.is_empty() {
        return Err(invalid("missing name".into()));
    }

    let MatchRecord { hash, name: pattern, generic } = record.matcher;
    let matcher = match (hash, pattern, generic) {
        (Some(hash), None, None) => {
            let hash = hash.trim().to_ascii_lowercase();
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid(format!("hash '{hash}' is not a 64-character SHA-256 hex digest")));
            }
            Matcher::Hash(hash)
        }
        (None, Some(pattern), None) => {
            let pattern = pattern.trim().to_string();
            if pattern.is_empty() {
                return Err(invalid("empty name pattern".into()));
            }
            Matcher::Name(pattern)
        }
        (None, None, Some(generic)) => Matcher::Generic(generic.parse().map_err(invalid)?),
        _ => return Err(invalid("match must set exactly one of hash, name, generic".into())),
    };

    let runtime = record.runtime.map(|r| r.parse::<RuntimeKind>()).transpose().map_err(invalid)?;
    let mut category = record.category.map(|c| c.parse::<Category>()).transpose().map_err(invalid)?;
    if let Matcher::Generic(generic_category) = matcher {
        if let Some(c) = category.filter(|c| *c != generic_category) {
            return Err(invalid(format!(
                "generic {generic_category} rule cannot override category to {c}"
            )));
        }
        category = Some(generic_category);
    }

    let mut overrides = BTreeMap::new();
    for (key, value) in record.overrides {
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(invalid("empty override key".into()));
        }
        if let Some(var) = key.strip_prefix("env.").filter(|v| RESERVED_ENV.contains(v)) {
            return Err(invalid(format!("override '{key}' cannot set {var}; it is managed per environment")));
        }
        let value = scalar_to_string(&value)
            .ok_or_else(|| invalid(format!("override '{key}' must be a scalar value")))?;
        overrides.insert(key, value);
    }

    Ok(ProgramRule {
        name,
        matcher,
        priority: record.priority,
        runtime,
        category,
        overrides,
        notes: record.notes,
        warning: record.warning,
        alternatives: record.alternatives,
        index: Some(index),
    })
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Reject tables where two records claim the same matcher.
fn check_conflicts(rules: &[ProgramRule]) -> Result<HashMap<String, usize>, RuleError> {
    let mut by_hash: HashMap<String, usize> = HashMap::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut by_generic: HashMap<(Category, Option<RuntimeKind>), usize> = HashMap::new();

    let conflict = |first: usize, second: usize, matcher: String| RuleError::RuleConflict {
        first: rules[first].index.unwrap_or(first),
        first_name: rules[first].name.clone(),
        second: rules[second].index.unwrap_or(second),
        second_name: rules[second].name.clone(),
        matcher,
    };

    for (pos, rule) in rules.iter().enumerate() {
        let previous = match &rule.matcher {
            Matcher::Hash(hash) => by_hash.insert(hash.clone(), pos),
            Matcher::Name(pattern) => by_name.insert(pattern.to_lowercase(), pos),
            Matcher::Generic(category) => by_generic.insert((*category, rule.runtime), pos),
        };
        if let Some(first) = previous {
            return Err(conflict(first, pos, rule.matcher.describe()));
        }
    }
    Ok(by_hash)
}
