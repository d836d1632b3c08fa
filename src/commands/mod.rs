//! CLI command implementations for herakles-proc-census.
//!
//! This module provides implementations for all CLI subcommands:
//! - `exec`: One local census plus one command exchange
//! - `check`: System validation
//! - `config`: Configuration file generation
//! - `generate`: Snapshot generation

pub mod check;
pub mod config;
pub mod exec;
pub mod generate;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use exec::command_exec;
pub use generate::command_generate_snapshot;
