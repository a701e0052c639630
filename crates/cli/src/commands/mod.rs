pub mod environments;
pub mod history;
pub mod inspect;
pub mod rules;
pub mod run;
pub mod util;

pub use environments::*;
pub use history::*;
pub use inspect::*;
pub use rules::*;
pub use run::*;
pub use util::*;
