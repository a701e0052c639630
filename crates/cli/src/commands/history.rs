use anyhow::{Context, Result};
use easyexe_core::db::HistoryDb;

use crate::commands::util::Session;

/// Show the most recent launches.
pub fn history_command(session: &Session, limit: usize, json: bool) -> Result<()> {
    let db_path = &session.data.history_db;
    let records = if db_path.is_file() {
        let db = HistoryDb::open(db_path).with_context(|| {
            format!("Failed to open history database at {}", db_path.display())
        })?;
        db.recent_launches(limit)?
    } else {
        Vec::new()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No launches recorded.");
        return Ok(());
    }
    for record in records {
        let code = record.exit_code.map(|c| format!(" (exit {c})")).unwrap_or_default();
        println!(
            "{}  {}  {}  {} via {}  {}{}",
            record.started_at,
            record.program_name,
            record.runtime,
            record.mode,
            if record.rule.is_empty() { "-" } else { record.rule.as_str() },
            record.outcome,
            code
        );
    }
    Ok(())
}
