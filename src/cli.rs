//! CLI arguments and subcommands for herakles-proc-census.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-proc-census",
    about = "Per-name process census with page residency counts",
    long_about = "Per-name process census with page residency counts.\n\n\
                  Groups running processes by executable name, counts resident and \
                  non-resident pages per group, and answers RESET / ALL / FILTER|<name> / \
                  DEL|<name> commands over a write-then-read HTTP channel.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "More info: https://www.herakles.now — Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file, default info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable /metrics endpoint
    #[arg(long)]
    pub disable_telemetry: bool,

    /// Number of store buckets (power of two)
    #[arg(long)]
    pub bucket_count: Option<usize>,

    /// Include only processes matching these names (comma-separated)
    #[arg(long)]
    pub include_names: Option<String>,

    /// Exclude processes matching these names (comma-separated)
    #[arg(long)]
    pub exclude_names: Option<String>,

    /// Parallel classification threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Fail a census that enumerates more processes than this
    #[arg(long)]
    pub max_processes: Option<usize>,

    /// Fail a census that would classify more pages than this
    #[arg(long)]
    pub max_pages: Option<u64>,

    /// Fail a census that runs longer than N seconds (default 30)
    #[arg(long)]
    pub census_timeout_secs: Option<u64>,

    /// Largest accepted command in bytes
    #[arg(long)]
    pub max_command_bytes: Option<usize>,

    /// Skip the census at startup (store starts empty until RESET)
    #[arg(long)]
    pub no_initial_census: bool,

    /// Path to JSON snapshot file (uses synthetic data instead of /proc)
    #[arg(short = 's', long)]
    pub snapshot_file: Option<PathBuf>,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one census and one command locally, print the report
    Exec {
        /// Command to send (RESET, ALL, FILTER|<name>, DEL|<name>)
        command: String,
    },

    /// Validate configuration and system requirements
    Check {
        /// Check pagemap accessibility
        #[arg(long)]
        memory: bool,

        /// Check /proc filesystem
        #[arg(long)]
        proc: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Generate synthetic snapshot JSON file
    GenerateSnapshot {
        /// Output file path
        #[arg(short = 'o', long, default_value = "snapshot.json")]
        output: PathBuf,

        /// Number of distinct process names
        #[arg(long, default_value_t = 8)]
        names: usize,

        /// Maximum number of processes per name
        #[arg(long, default_value_t = 4)]
        max_per_name: usize,
    },

    /// Check runtime requirements and permissions
    CheckRequirements,
}
