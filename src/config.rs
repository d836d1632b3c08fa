//! Configuration management for herakles-proc-census.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use herakles_proc_census::census::CensusLimits;
use herakles_proc_census::service::DEFAULT_MAX_COMMAND_BYTES;
use herakles_proc_census::store::DEFAULT_BUCKET_COUNT;
use herakles_proc_census::ProcessFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_CENSUS_TIMEOUT_SECS: u64 = 30;

/// Service configuration. Every field is optional so a partial file merges
/// cleanly with CLI overrides; consumers fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Store and census
    #[serde(alias = "bucket-count")]
    pub bucket_count: Option<usize>,
    #[serde(alias = "max-processes")]
    pub max_processes: Option<usize>,
    #[serde(alias = "max-pages")]
    pub max_pages: Option<u64>,
    #[serde(alias = "census-timeout-secs")]
    pub census_timeout_secs: Option<u64>,
    pub parallelism: Option<usize>,
    #[serde(alias = "include-names")]
    pub include_names: Option<Vec<String>>,
    #[serde(alias = "exclude-names")]
    pub exclude_names: Option<Vec<String>>,
    #[serde(alias = "initial-census")]
    pub initial_census: Option<bool>,

    // Channel
    #[serde(alias = "max-command-bytes")]
    pub max_command_bytes: Option<usize>,

    /// Path to JSON snapshot file (uses synthetic data instead of /proc)
    #[serde(alias = "snapshot-file")]
    pub snapshot_file: Option<PathBuf>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            bucket_count: Some(DEFAULT_BUCKET_COUNT),
            max_processes: None,
            max_pages: None,
            census_timeout_secs: Some(DEFAULT_CENSUS_TIMEOUT_SECS),
            parallelism: None,
            include_names: None,
            exclude_names: None,
            initial_census: Some(true),
            max_command_bytes: Some(DEFAULT_MAX_COMMAND_BYTES),
            snapshot_file: None,
            enable_health: Some(true),
            enable_telemetry: Some(true),
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn bucket_count(&self) -> usize {
        self.bucket_count.unwrap_or(DEFAULT_BUCKET_COUNT)
    }

    pub fn max_command_bytes(&self) -> usize {
        self.max_command_bytes.unwrap_or(DEFAULT_MAX_COMMAND_BYTES)
    }

    pub fn census_limits(&self) -> CensusLimits {
        CensusLimits {
            max_processes: self.max_processes,
            max_pages: self.max_pages,
            timeout: Some(Duration::from_secs(
                self.census_timeout_secs.unwrap_or(DEFAULT_CENSUS_TIMEOUT_SECS),
            )),
        }
    }

    pub fn process_filter(&self) -> ProcessFilter {
        ProcessFilter {
            include: self.include_names.clone().unwrap_or_default(),
            exclude: self.exclude_names.clone().unwrap_or_default(),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let buckets = cfg.bucket_count();
    if !buckets.is_power_of_two() {
        return Err(format!("bucket_count must be a power of two, got {}", buckets).into());
    }

    if cfg.max_command_bytes() == 0 {
        return Err("max_command_bytes must be greater than 0".into());
    }

    if cfg.census_timeout_secs == Some(0) {
        return Err("census_timeout_secs must be greater than 0".into());
    }

    if let Some(path) = &cfg.snapshot_file {
        if !path.exists() {
            return Err(format!("Snapshot file not found: {}", path.display()).into());
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "certificate")?;
                check_pem_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {} file is empty: {}", what, path).into()),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("TLS {} file not found: {}", what, path).into())
        }
        Err(e) => Err(format!("TLS {} file is not readable: {} ({})", what, path, e).into()),
    }
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    // Store and census
    if let Some(n) = args.bucket_count {
        config.bucket_count = Some(n);
    }
    if let Some(n) = args.max_processes {
        config.max_processes = Some(n);
    }
    if let Some(n) = args.max_pages {
        config.max_pages = Some(n);
    }
    if let Some(secs) = args.census_timeout_secs {
        config.census_timeout_secs = Some(secs);
    }
    if let Some(n) = args.parallelism {
        config.parallelism = Some(n);
    }
    if let Some(include_str) = &args.include_names {
        config.include_names = Some(split_names(include_str));
    }
    if let Some(exclude_str) = &args.exclude_names {
        config.exclude_names = Some(split_names(exclude_str));
    }
    if args.no_initial_census {
        config.initial_census = Some(false);
    }
    if let Some(n) = args.max_command_bytes {
        config.max_command_bytes = Some(n);
    }
    if let Some(path) = &args.snapshot_file {
        config.snapshot_file = Some(path.clone());
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/herakles/proc-census.yaml",
                "/etc/herakles/proc-census.yml",
                "/etc/herakles/proc-census.json",
                "./herakles-proc-census.yaml",
                "./herakles-proc-census.yml",
                "./herakles-proc-census.json",
            ];
            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(found) => PathBuf::from(found),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format.
pub fn render_config(config: &Config, format: &ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_effective_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_bucket_count_must_be_power_of_two() {
        let cfg = Config {
            bucket_count: Some(12),
            ..Config::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let cfg = Config {
            max_command_bytes: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());

        let cfg = Config {
            census_timeout_secs: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_tls_requires_both_files() {
        let cfg = Config {
            enable_tls: Some(true),
            tls_cert_path: Some("/tmp/cert.pem".into()),
            ..Config::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("tls_key_path"));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let cfg: Config = serde_yaml::from_str("port: 9300\nbucket-count: 16\n").unwrap();
        assert_eq!(cfg.port, Some(9300));
        assert_eq!(cfg.bucket_count(), 16);
        assert_eq!(cfg.max_command_bytes(), DEFAULT_MAX_COMMAND_BYTES);
        assert_eq!(
            cfg.census_limits().timeout,
            Some(Duration::from_secs(DEFAULT_CENSUS_TIMEOUT_SECS))
        );
    }

    #[test]
    fn test_filter_from_config() {
        let cfg = Config {
            include_names: Some(vec!["nginx".into()]),
            exclude_names: Some(vec!["test".into()]),
            ..Config::default()
        };
        let filter = cfg.process_filter();
        assert!(filter.accepts("nginx-worker"));
        assert!(!filter.accepts("test-nginx"));
        assert!(!filter.accepts("sshd"));
    }

    #[test]
    fn test_split_names() {
        assert_eq!(split_names("a, b,,c "), vec!["a", "b", "c"]);
    }
}
