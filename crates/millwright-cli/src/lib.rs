//! Wires a loaded simulation document into live domain objects and exposes
//! the `run(days?)` command surface. The actual `main` lives in
//! `src/main.rs` so integration tests can drive [`cli::Cli`] directly.

pub mod build;
pub mod cli;
pub mod error;
pub mod telemetry;

pub use cli::Cli;
pub use error::{CliError, Result};
