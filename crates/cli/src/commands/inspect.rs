use std::path::Path;

use anyhow::Result;
use easyexe_core::pipeline::PipelineOptions;

use crate::commands::run::print_decision;
use crate::commands::util::{canonicalize_or_current, Session};

/// Show how a file would be handled: fingerprint, classification, winning
/// rule, runtime and profile. Nothing is created or spawned.
pub fn inspect_command(session: &Session, path: &Path, json: bool) -> Result<()> {
    let pipeline = session.pipeline()?;
    let target = canonicalize_or_current(path)?;
    let decision = pipeline.plan(&target, &PipelineOptions { dry_run: true, ..Default::default() })?;

    if json {
        return print_decision(&decision, true);
    }

    let fp = &decision.fingerprint;
    println!("File:       {}", fp.path.display());
    println!("Size:       {} bytes", fp.size);
    println!("Kind:       {}", fp.kind);
    println!("Subsystem:  {:?}", fp.subsystem);
    if let Some(header) = fp.extended_header {
        println!("Header:     {header:?}");
    }
    if let Some(machine) = fp.machine {
        println!("Machine:    {machine:?}");
    }
    println!("Imports:    {}", fp.imports.len());
    if !fp.markers.is_empty() {
        println!("Markers:    {}", fp.markers.join(", "));
    }
    if decision.classification.evidence.is_empty() {
        println!("Evidence:   (none)");
    } else {
        println!("Evidence:");
        for item in &decision.classification.evidence {
            println!("  - {item}");
        }
    }
    if let Some(notes) = &decision.rule_match.rule.notes {
        println!("Notes:      {notes}");
    }
    println!();
    print_decision(&decision, false)
}
