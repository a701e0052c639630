use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// How long a writer waits for another invocation's transaction to finish.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for history database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// One launch, as stored in the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub identity: String,
    pub program_name: String,
    pub program_hash: String,
    pub runtime: String,
    pub rule: String,
    pub mode: String,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    /// `exited`, `cancelled`, `detached` or `failed`.
    pub outcome: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// SQLite-backed launch history.
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open (or create) the history database and bring its schema up to date.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert a launch record and return its row id.
    pub fn insert_launch(&self, record: &LaunchRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO launches (identity, program_name, program_hash, runtime, rule, mode,
                                  started_at, finished_at, outcome, exit_code)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.identity,
                record.program_name,
                record.program_hash,
                record.runtime,
                record.rule,
                record.mode,
                record.started_at,
                record.finished_at,
                record.outcome,
                record.exit_code
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent launches first, at most `limit` rows.
    pub fn recent_launches(&self, limit: usize) -> DbResult<Vec<LaunchRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, identity, program_name, program_hash, runtime, rule, mode,
                   started_at, finished_at, outcome, exit_code
            FROM launches
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok(LaunchRecord {
                id: row.get(0)?,
                identity: row.get(1)?,
                program_name: row.get(2)?,
                program_hash: row.get(3)?,
                runtime: row.get(4)?,
                rule: row.get(5)?,
                mode: row.get(6)?,
                started_at: row.get(7)?,
                finished_at: row.get(8)?,
                outcome: row.get(9)?,
                exit_code: row.get(10)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// Version map:
/// - 0: no schema
/// - 1: launches table
/// - 2: record the winning rule per launch
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS launches (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                identity      TEXT NOT NULL,
                program_name  TEXT NOT NULL,
                program_hash  TEXT NOT NULL,
                runtime       TEXT NOT NULL,
                mode          TEXT NOT NULL,
                started_at    TEXT NOT NULL,
                finished_at   TEXT,
                outcome       TEXT NOT NULL,
                exit_code     INTEGER
            );
            CREATE INDEX IF NOT EXISTS launches_identity ON launches(identity);

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            ALTER TABLE launches ADD COLUMN rule TEXT NOT NULL DEFAULT '';
            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
