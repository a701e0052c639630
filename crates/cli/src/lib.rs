//! easy-exe CLI library: command implementations kept out of `main.rs` so
//! they can be exercised directly from tests.

pub mod commands;

pub use commands::util::{canonicalize_or_current, exit_code_for, GlobalOpts, Session};
