//! Application state management for the census server.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use herakles_proc_census::CensusService;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::metrics::CensusMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub service: Arc<CensusService>,
    pub registry: Registry,
    pub metrics: CensusMetrics,
    pub config: Arc<Config>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
