//! easyexe-core
//!
//! Decision pipeline for launching DOS and Windows executables on a
//! non-Windows host: sniff the file, classify it, pick a rule, synthesize a
//! runtime profile, bind a persistent per-program environment and spawn the
//! runtime.
//!
//! All substantive logic lives here so it is testable without the CLI.

pub mod model;
pub mod sniff;
pub mod classify;
pub mod rules;
pub mod profile;
pub mod environment;
pub mod services;
pub mod db;
pub mod config;
pub mod pipeline;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
