//! Turns a runtime profile into the concrete command line, process
//! environment and generated files for one launch.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::environment::StoreLayout;
use crate::model::{ExecutableFingerprint, Machine, RuntimeKind};
use crate::profile::{render_dos_config, RuntimeProfile};

/// A file written right before the runtime is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Everything needed to start the runtime for one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPlan {
    pub runtime: RuntimeKind,
    /// Runtime binary to execute.
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
    #[serde(default)]
    pub files: Vec<PlannedFile>,
    pub environment_identity: String,
    pub environment_dir: PathBuf,
    /// The user's executable.
    pub target: PathBuf,
}

impl fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "runtime:     {}", self.runtime)?;
        writeln!(f, "environment: {} ({})", self.environment_identity, self.environment_dir.display())?;
        writeln!(f, "workdir:     {}", self.working_dir.display())?;
        for (key, value) in &self.env {
            writeln!(f, "env:         {key}={value}")?;
        }
        for file in &self.files {
            writeln!(f, "writes:      {}", file.path.display())?;
        }
        write!(f, "command:     {}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Environment variables owned by the plan; `env.*` overrides cannot set them.
pub const RESERVED_ENV: [&str; 3] = ["WINEPREFIX", "WINEARCH", "WINEDLLOVERRIDES"];

/// Build the launch plan for `fingerprint` under `profile`.
///
/// Pure: nothing is created on disk. `layout` only supplies paths.
pub fn build_plan(
    fingerprint: &ExecutableFingerprint,
    profile: &RuntimeProfile,
    runtime_bin: &Path,
    layout: &StoreLayout,
    identity: &str,
) -> LaunchPlan {
    let environment_dir = layout.environment_dir(identity);
    let state_dir = layout.state_dir(identity, profile.runtime);
    let target = fingerprint.path.clone();
    let target_dir = target.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    let mut plan = LaunchPlan {
        runtime: profile.runtime,
        program: runtime_bin.to_path_buf(),
        args: Vec::new(),
        env: BTreeMap::new(),
        working_dir: target_dir.clone(),
        files: Vec::new(),
        environment_identity: identity.to_string(),
        environment_dir: environment_dir.clone(),
        target: target.clone(),
    };

    match profile.runtime {
        RuntimeKind::WindowsLayer => {
            for (key, value) in &profile.config {
                if let Some(name) = key.strip_prefix("env.") {
                    plan.env.insert(name.to_string(), value.clone());
                }
            }
            // Inserted last so `env.*` overrides never move the prefix.
            plan.env.insert("WINEPREFIX".to_string(), state_dir.display().to_string());
            let arch = profile
                .get("wine.arch")
                .map(str::to_string)
                .unwrap_or_else(|| default_wine_arch(fingerprint.machine).to_string());
            plan.env.insert("WINEARCH".to_string(), arch);
            match profile.get("wine.dll_overrides").filter(|v| !v.is_empty()) {
                Some(overrides) => {
                    plan.env.insert("WINEDLLOVERRIDES".to_string(), overrides.to_string());
                }
                None => {
                    plan.env.remove("WINEDLLOVERRIDES");
                }
            }

            if let Some(size) = profile.get("wine.virtual_desktop").filter(|v| !v.is_empty()) {
                plan.args.push("explorer".to_string());
                plan.args.push(format!("/desktop=easy-exe,{size}"));
            }
            plan.args.push(target.display().to_string());
            if let Some(extra) = profile.get("wine.args") {
                plan.args.extend(extra.split_whitespace().map(str::to_string));
            }
        }
        RuntimeKind::DosEmulator => {
            let conf = environment_dir.join("dosbox.conf");
            plan.files.push(PlannedFile { path: conf.clone(), contents: render_dos_config(profile) });
            let program_name = fingerprint.file_name();
            plan.args = vec![
                "-conf".to_string(),
                conf.display().to_string(),
                "-c".to_string(),
                format!("mount c \"{}\"", state_dir.display()),
                "-c".to_string(),
                format!("mount d \"{}\"", target_dir.display()),
                "-c".to_string(),
                "d:".to_string(),
                "-c".to_string(),
                program_name,
                "-c".to_string(),
                "exit".to_string(),
            ];
            plan.working_dir = environment_dir;
        }
    }
    plan
}

/// Prefix architecture when the profile does not pin one.
pub fn default_wine_arch(machine: Option<Machine>) -> &'static str {
    match machine {
        Some(Machine::X86_64) | Some(Machine::Arm64) => "win64",
        _ => "win32",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BinaryKind, Category, SubsystemHint};

    fn fingerprint(kind: BinaryKind, machine: Option<Machine>) -> ExecutableFingerprint {
        ExecutableFingerprint {
            path: PathBuf::from("/games/keen/KEEN.EXE"),
            kind,
            subsystem: SubsystemHint::Unknown,
            extended_header: None,
            machine,
            hash: "00".repeat(32),
            size: 1024,
            imports: Vec::new(),
            strings: Vec::new(),
            markers: Vec::new(),
        }
    }

    #[test]
    fn wine_plan_sets_prefix_and_arch() {
        let layout = StoreLayout::new("/data/environments");
        let mut config = BTreeMap::new();
        config.insert("env.DXVK_HUD".to_string(), "1".to_string());
        config.insert("wine.dll_overrides".to_string(), "d3d9=n".to_string());
        let profile =
            RuntimeProfile { runtime: RuntimeKind::WindowsLayer, category: Category::Game, config };
        let fp = fingerprint(BinaryKind::Windows, Some(Machine::X86_64));

        let plan = build_plan(&fp, &profile, Path::new("/usr/bin/wine"), &layout, "win-abc");
        assert_eq!(plan.env["WINEPREFIX"], "/data/environments/win-abc/prefix");
        assert_eq!(plan.env["WINEARCH"], "win64");
        assert_eq!(plan.env["WINEDLLOVERRIDES"], "d3d9=n");
        assert_eq!(plan.env["DXVK_HUD"], "1");
        assert_eq!(plan.args, vec!["/games/keen/KEEN.EXE".to_string()]);
        assert!(plan.files.is_empty());
    }

    #[test]
    fn env_overrides_cannot_move_the_prefix() {
        let layout = StoreLayout::new("/data/environments");
        let mut config = BTreeMap::new();
        config.insert("env.WINEPREFIX".to_string(), "/home/user/.wine".to_string());
        config.insert("env.WINEARCH".to_string(), "win64".to_string());
        config.insert("env.WINEDLLOVERRIDES".to_string(), "d3d9=n".to_string());
        let profile = RuntimeProfile {
            runtime: RuntimeKind::WindowsLayer,
            category: Category::Application,
            config,
        };
        let fp = fingerprint(BinaryKind::Windows, Some(Machine::X86));

        let plan = build_plan(&fp, &profile, Path::new("/usr/bin/wine"), &layout, "win-abc");
        assert_eq!(plan.env["WINEPREFIX"], "/data/environments/win-abc/prefix");
        assert_eq!(plan.env["WINEARCH"], "win32");
        assert!(!plan.env.contains_key("WINEDLLOVERRIDES"));
    }

    #[test]
    fn dos_plan_writes_config_and_mounts() {
        let layout = StoreLayout::new("/data/environments");
        let mut config = BTreeMap::new();
        config.insert("cpu.cycles".to_string(), "max".to_string());
        let profile =
            RuntimeProfile { runtime: RuntimeKind::DosEmulator, category: Category::Game, config };
        let fp = fingerprint(BinaryKind::Dos, None);

        let plan = build_plan(&fp, &profile, Path::new("/usr/bin/dosbox"), &layout, "dos-abc");
        assert_eq!(plan.files.len(), 1);
        assert!(plan.files[0].contents.contains("cycles=max"));
        assert!(plan.args.contains(&"mount d \"/games/keen\"".to_string()));
        assert!(plan.args.contains(&"KEEN.EXE".to_string()));
        assert!(plan.env.is_empty());
    }
}
