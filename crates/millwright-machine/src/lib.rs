//! Program execution, the durable issue taxonomy, and the machine state
//! machine that drives one production cell of the factory floor.

pub mod error;
pub mod issue;
pub mod machine;
pub mod program;

pub use error::{MachineError, Result};
pub use issue::Issue;
pub use machine::{Machine, MachineEvents, MachineState, ERROR_PRIORITY};
pub use program::{Program, RunContext, RunOutcome};
