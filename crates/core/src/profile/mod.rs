//! Config synthesizer: base configuration per (runtime, category), with the
//! winning rule's overrides merged key by key on top.
//!
//! Option keys are namespaced strings:
//! - DOS emulator: `section.key`, rendered as `[section]` / `key=value`.
//! - Windows layer: `env.NAME` (process environment), `wine.arch`,
//!   `wine.dll_overrides`, `wine.virtual_desktop`, `wine.args`. When
//!   `wine.arch` is unset the prefix architecture follows the PE machine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Category, Classification, RuntimeKind};
use crate::rules::ProgramRule;

/// Resolved runtime configuration for one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeProfile {
    pub runtime: RuntimeKind,
    pub category: Category,
    pub config: BTreeMap<String, String>,
}

impl RuntimeProfile {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(body: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(body)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Base configuration derived only from runtime kind and category.
pub fn base_config(runtime: RuntimeKind, category: Category) -> BTreeMap<String, String> {
    let pairs: &[(&str, &str)] = match (runtime, category) {
        (RuntimeKind::DosEmulator, Category::Game) => &[
            ("cpu.core", "dynamic"),
            ("cpu.cputype", "auto"),
            ("cpu.cycles", "max"),
            ("sdl.fullscreen", "true"),
            ("sdl.output", "opengl"),
            ("render.aspect", "true"),
            ("mixer.rate", "44100"),
            ("sblaster.sbtype", "sb16"),
            ("dos.ems", "true"),
            ("dos.xms", "true"),
        ],
        (RuntimeKind::DosEmulator, Category::Application) => &[
            ("cpu.core", "normal"),
            ("cpu.cputype", "auto"),
            ("cpu.cycles", "fixed 3000"),
            ("sdl.fullscreen", "false"),
            ("sdl.output", "surface"),
            ("render.aspect", "false"),
            ("sblaster.sbtype", "none"),
            ("dos.ems", "true"),
            ("dos.xms", "true"),
        ],
        (RuntimeKind::WindowsLayer, Category::Application) => &[
            ("env.WINEDEBUG", "-all"),
            ("wine.dll_overrides", "winemenubuilder.exe=d"),
        ],
        (RuntimeKind::WindowsLayer, Category::Game) => &[
            ("env.WINEDEBUG", "-all"),
            ("env.WINEESYNC", "1"),
            ("env.WINEFSYNC", "1"),
            ("env.DXVK_HUD", "0"),
            ("env.STAGING_SHARED_MEMORY", "1"),
            ("env.__GL_SHADER_DISK_CACHE", "1"),
            ("wine.dll_overrides", "winemenubuilder.exe=d;d3d9,d3d10core,d3d11,dxgi=n,b"),
        ],
    };
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Merge `overrides` onto `base`: present keys replace, absent keys stay.
///
/// Applying the same overrides again yields the same map.
pub fn merge_overrides(
    mut base: BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    for (key, value) in overrides {
        base.insert(key.clone(), value.clone());
    }
    base
}

/// Build the runtime profile for a resolved runtime and winning rule.
pub fn synthesize(
    classification: &Classification,
    rule: &ProgramRule,
    runtime: RuntimeKind,
) -> RuntimeProfile {
    let category = rule.category.unwrap_or(classification.category);
    let config = merge_overrides(base_config(runtime, category), &rule.overrides);
    RuntimeProfile { runtime, category, config }
}

/// Render DOS emulator options (`section.key`) as an INI-style config file.
pub fn render_dos_config(profile: &RuntimeProfile) -> String {
    let mut sections: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for (key, value) in &profile.config {
        if let Some((section, name)) = key.split_once('.') {
            sections.entry(section).or_default().push((name, value.as_str()));
        }
    }
    let mut out = String::from("# Generated by easy-exe; regenerated on every launch.\n");
    for (section, entries) in sections {
        out.push_str(&format!("\n[{section}]\n"));
        for (name, value) in entries {
            out.push_str(&format!("{name}={value}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_replaces_only_present_keys() {
        let base = base_config(RuntimeKind::DosEmulator, Category::Application);
        let mut overrides = BTreeMap::new();
        overrides.insert("cpu.cycles".to_string(), "max".to_string());
        let merged = merge_overrides(base.clone(), &overrides);
        assert_eq!(merged["cpu.cycles"], "max");
        assert_eq!(merged["cpu.core"], base["cpu.core"]);
        assert_eq!(merged.len(), base.len());
    }

    #[test]
    fn render_groups_keys_by_section() {
        let mut config = BTreeMap::new();
        config.insert("cpu.cycles".to_string(), "max".to_string());
        config.insert("cpu.core".to_string(), "dynamic".to_string());
        config.insert("sdl.fullscreen".to_string(), "true".to_string());
        let profile =
            RuntimeProfile { runtime: RuntimeKind::DosEmulator, category: Category::Game, config };
        let text = render_dos_config(&profile);
        assert!(text.contains("[cpu]\ncore=dynamic\ncycles=max\n"));
        assert!(text.contains("[sdl]\nfullscreen=true\n"));
    }
}
