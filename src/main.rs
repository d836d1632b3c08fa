//! herakles-proc-census - version 0.1.0
//!
//! Process census server with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod metrics;
mod source;
mod startup_checks;
mod state;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, level_filters::LevelFilter};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_exec, command_generate_snapshot};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{
    health_handler, metrics_handler, read_report_handler, root_handler, write_command_handler,
};
use metrics::CensusMetrics;
use state::AppState;

/// Maps the effective log level (CLI > config > info) to a filter.
fn resolve_log_level(config: &Config, args: &Args) -> LevelFilter {
    if let Some(level) = &args.log_level {
        return match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        };
    }
    match config.log_level.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("off") => LevelFilter::OFF,
        Some("error") => LevelFilter::ERROR,
        Some("warn") => LevelFilter::WARN,
        Some("debug") => LevelFilter::DEBUG,
        Some("trace") => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// Initializes tracing logging subsystem with configured log level.
/// Logs go to stderr so `exec` output on stdout stays clean.
fn setup_logging(config: &Config, args: &Args) {
    let log_level = resolve_log_level(config, args);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {}", log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        if let Commands::CheckRequirements = command {
            println!("🔍 Checking Runtime Requirements");
            println!("================================\n");

            match startup_checks::validate_requirements(Path::new("/proc")) {
                Ok(_) => {
                    println!("\n✅ All requirements met - ready for production!");
                    std::process::exit(0);
                }
                Err(e) => {
                    eprintln!("\n❌ Requirements check failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        let config = load_validated_config(&args)?;
        setup_logging(&config, &args);

        return match command {
            Commands::Exec { command: raw } => {
                source::configure_parallelism(&config)?;
                command_exec(raw, &config)
            }

            Commands::Check { memory, proc, all } => command_check(*memory, *proc, *all, &config),

            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),

            Commands::GenerateSnapshot {
                output,
                names,
                max_per_name,
            } => command_generate_snapshot(output.clone(), *names, *max_per_name, &config),

            Commands::CheckRequirements => Ok(()),
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&config, &args);

    info!("Starting herakles-proc-census");

    if config.snapshot_file.is_none() {
        if let Err(e) = startup_checks::validate_requirements(Path::new("/proc")) {
            error!("❌ Startup validation failed: {}", e);
            error!("   The server will start but censuses may be incomplete!");
        }
    }

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    if let Err(e) = source::configure_parallelism(&config) {
        error!("Failed to set rayon thread pool: {}", e);
    }

    let service = Arc::new(source::build_service(&config)?);

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let metrics = CensusMetrics::new(&registry)?;
    debug!("All metrics registered successfully");

    // Perform initial census
    if config.initial_census.unwrap_or(true) {
        info!("Performing initial census");
        let svc = service.clone();
        match tokio::task::spawn_blocking(move || svc.rebuild()).await {
            Ok(Ok(summary)) => info!(
                "Initial census completed: {} groups, {} processes",
                summary.groups, summary.processes
            ),
            Ok(Err(e)) => error!("Initial census failed: {}", e),
            Err(e) => error!("Initial census task failed: {}", e),
        }
    } else {
        info!("Initial census disabled - store stays empty until RESET");
    }

    let state = Arc::new(AppState {
        service: service.clone(),
        registry,
        metrics,
        config: Arc::new(config.clone()),
        start_time: Instant::now(),
    });

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route(
            "/command",
            get(read_report_handler).post(write_command_handler),
        );

    if state.config.enable_telemetry.unwrap_or(true) {
        app = app.route("/metrics", get(metrics_handler));
    } else {
        debug!("/metrics disabled");
    }

    if state.config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    } else {
        debug!("/health disabled");
    }

    let app = app.with_state(state.clone());

    if config.enable_tls.unwrap_or(false) {
        // Presence checked by validate_effective_config()
        let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) else {
            return Err("TLS enabled without certificate and key".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!(
            "herakles-proc-census listening on https://{}:{}",
            bind_ip_str, port
        );

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "herakles-proc-census listening on http://{}:{}",
            bind_ip_str, port
        );

        let server = axum::serve(listener, app);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    }

    service.shutdown();
    info!("herakles-proc-census stopped gracefully");
    Ok(())
}
