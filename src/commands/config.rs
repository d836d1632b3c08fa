//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("herakles-proc-census.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Process Census Configuration
# =====================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                   # HTTP port
#
# Store and Census
# ----------------
# bucket_count: 8              # Store buckets, power of two
# max_processes: null          # Fail a census enumerating more processes
# max_pages: null              # Fail a census classifying more pages
# census_timeout_secs: 30      # Fail a census running longer than this
# parallelism: null            # Classification threads (null = auto)
# include_names: null          # Include only processes matching these names
# exclude_names: null          # Exclude processes matching these names
# initial_census: true         # Populate the store at startup
#
# Channel
# -------
# max_command_bytes: 4096      # Larger writes get "[ERROR]: Bad address"
# snapshot_file: null          # JSON snapshot instead of /proc
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_telemetry: true       # Enable /metrics endpoint
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{yaml}")
}
