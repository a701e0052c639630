//! Launch history database.

mod history;

pub use history::{DbError, DbResult, HistoryDb, LaunchRecord, CURRENT_SCHEMA_VERSION};
