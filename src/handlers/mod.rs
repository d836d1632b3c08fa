//! HTTP endpoint handlers for the census server.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/command`: write a command (POST) and read its report (GET)
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: Census statistics endpoint
//! - `/`: Landing page

pub mod channel;
pub mod health;
pub mod metrics;
pub mod root;

// Re-export handlers
pub use channel::{read_report_handler, write_command_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;
