//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! census statistics as a plain-text table.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::atomic::Ordering;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "More info: https://www.herakles.now — Support: exporter@herakles.now";

/// Formats an uptime in the largest sensible unit.
pub fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
///
/// 200 once a census has succeeded, 503 while the only censuses run have
/// failed. A server started without an initial census is healthy.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let stats = state.service.stats();
    let succeeded = stats.census_success_count.load(Ordering::Relaxed);
    let failed = stats.census_failure_count.load(Ordering::Relaxed);

    let (status, message) = if succeeded > 0 {
        (StatusCode::OK, "OK")
    } else if failed > 0 {
        (StatusCode::SERVICE_UNAVAILABLE, "Census failed")
    } else {
        (StatusCode::OK, "OK - No census yet")
    };

    let (groups, processes) = state
        .service
        .with_store(|s| (s.len(), s.process_count()));
    let uptime_str = format_uptime(stats.get_uptime_seconds());
    let table = stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nUptime: {uptime_str}\nStore: {groups} groups, {processes} processes\n\n{table}\n{FOOTER_TEXT}"
        ),
    )
}
