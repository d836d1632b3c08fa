//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with the channel protocol and available endpoints.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let version = env!("CARGO_PKG_VERSION");
    // Emitted by build.rs; absent outside a git checkout
    let commit = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown");

    // Calculate actual uptime from service start time
    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);
    let groups = state.service.with_store(|s| s.len());

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Herakles Process Census</title>
    <style>
        body {{ font-family: sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }}
        .container {{ max-width: 860px; margin: 0 auto; background: white; padding: 32px; border-radius: 6px; }}
        h1 {{ color: #333; border-bottom: 3px solid #2f6f4f; padding-bottom: 12px; }}
        .subtitle, .endpoint-desc, .footer {{ color: #666; }}
        .info {{ display: flex; gap: 40px; background: #e9ecef; padding: 15px; border-radius: 4px; }}
        .info-label {{ display: block; font-weight: 600; font-size: 0.9em; }}
        .info-value {{ font-size: 1.2em; color: #2f6f4f; }}
        .endpoint-list {{ list-style: none; padding: 0; }}
        .endpoint-list li {{ margin: 12px 0; padding: 12px; background: #f8f9fa; border-left: 4px solid #2f6f4f; }}
        .endpoint-list a {{ color: #2f6f4f; font-weight: 600; text-decoration: none; }}
        .footer {{ margin-top: 32px; border-top: 1px solid #ddd; padding-top: 16px; text-align: center; font-size: 0.9em; }}
        code {{ background: #e9ecef; padding: 2px 6px; border-radius: 3px; }}
    </style>
</head>
<body>
<div class="container">
    <h1>Herakles Process Census</h1>
    <p class="subtitle">Processes grouped by name with resident and non-resident page counts</p>

    <div class="info">
        <div class="info-item">
            <span class="info-label">Version</span>
            <span class="info-value">{version}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Commit</span>
            <span class="info-value">{commit}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Uptime</span>
            <span class="info-value">{uptime}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Groups</span>
            <span class="info-value">{groups}</span>
        </div>
    </div>

    <h2>Command Channel</h2>
    <p>Write a command with <code>POST /command</code>, then read its report with <code>GET /command</code>.</p>
    <ul class="endpoint-list">
        <li><code>RESET</code><div class="endpoint-desc">Rebuild the store from a fresh census</div></li>
        <li><code>ALL</code><div class="endpoint-desc">List every group</div></li>
        <li><code>FILTER|&lt;name&gt;</code><div class="endpoint-desc">Show one group</div></li>
        <li><code>DEL|&lt;name&gt;</code><div class="endpoint-desc">Delete one group</div></li>
    </ul>

    <h2>Available Endpoints</h2>
    <ul class="endpoint-list">
        <li>
            <a href="/command">/command</a>
            <div class="endpoint-desc">Report for the pending command (text)</div>
        </li>
        <li>
            <a href="/metrics">/metrics</a>
            <div class="endpoint-desc">Prometheus-compatible per-group page gauges</div>
        </li>
        <li>
            <a href="/health">/health</a>
            <div class="endpoint-desc">Census statistics (text)</div>
        </li>
    </ul>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = version,
        commit = commit,
        uptime = uptime_str,
        groups = groups,
        footer = FOOTER_TEXT
    );

    Html(html)
}
