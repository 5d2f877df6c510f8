//! CLI command handlers. Each command is in its own file.

mod config;
mod process;
mod run;

pub use config::run_config;
pub use run::{run_command, Interrupted, RunOptions};
