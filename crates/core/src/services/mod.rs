//! Side-effecting services around the pure decision stages: locating
//! runtimes, planning the command line, and spawning it.

pub mod launcher;
pub mod plan;
pub mod probe;

pub use launcher::{CancelToken, LaunchError, LaunchMode, LaunchOutcome, Launcher};
pub use plan::{build_plan, LaunchPlan, PlannedFile};
pub use probe::{Availability, RuntimeProbe, SystemProbe};
