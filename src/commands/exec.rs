//! Exec command implementation.
//!
//! Builds a service from the effective configuration, runs one census and
//! prints the report of a single command. Handy for scripting and for
//! trying commands without starting the server.

use tracing::debug;

use crate::config::Config;
use crate::source::build_service;

/// Runs one command against a fresh census and prints the report.
pub fn command_exec(command: &str, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let service = build_service(config)?;

    if let Err(e) = service.rebuild() {
        eprintln!("❌ Census failed: {}", e);
        std::process::exit(1);
    }

    debug!("Sending command {:?}", command);
    let report = service.exchange(command.as_bytes());
    print!("{}", report);

    service.shutdown();
    Ok(())
}
