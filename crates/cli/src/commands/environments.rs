use anyhow::Result;
use serde::Serialize;

use crate::commands::util::Session;

#[derive(Serialize)]
struct EnvironmentInfo {
    identity: String,
    runtime: String,
    program_name: String,
    program_hash: String,
    created_at: String,
    dirty: bool,
    path: String,
}

/// List environments in the store.
pub fn list_environments_command(session: &Session, json: bool) -> Result<()> {
    let store = session.store();
    let infos: Vec<EnvironmentInfo> = store
        .list()?
        .into_iter()
        .map(|env| EnvironmentInfo {
            identity: env.meta.identity,
            runtime: env.meta.runtime.to_string(),
            program_name: env.meta.program_name,
            program_hash: env.meta.program_hash,
            created_at: env.meta.created_at,
            dirty: env.meta.dirty,
            path: env.root.display().to_string(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if infos.is_empty() {
        println!("No environments in {}.", store.root().display());
        return Ok(());
    }
    println!("Environments in {}:", store.root().display());
    for info in infos {
        let dirty = if info.dirty { " [dirty]" } else { "" };
        println!(
            "- {} ({}) {} created {}{}",
            info.identity, info.runtime, info.program_name, info.created_at, dirty
        );
    }
    Ok(())
}
