//! Command channel handlers.
//!
//! `POST /command` stores the request body as the pending command.
//! `GET /command` executes the pending command and returns its report.
//! Reports are plain text in the channel's line format.

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error, instrument};

use herakles_proc_census::ChannelError;

use crate::state::SharedState;

const TEXT_PLAIN: (&str, &str) = ("Content-Type", "text/plain; charset=utf-8");

/// Handler for `POST /command`.
#[instrument(skip(state, body), fields(len = body.len()))]
pub async fn write_command_handler(State(state): State<SharedState>, body: Bytes) -> impl IntoResponse {
    debug!("Processing POST /command request");

    // Waits for the gate while a RESET is running
    let service = state.service.clone();
    let written = tokio::task::spawn_blocking(move || service.write_command(&body))
        .await
        .unwrap_or_else(|e| {
            error!("Write task failed: {}", e);
            Err(ChannelError::Unknown)
        });

    match written {
        Ok(_) => (StatusCode::NO_CONTENT, [TEXT_PLAIN], String::new()),
        Err(e) => {
            let status = match e {
                ChannelError::BadAddress => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, [TEXT_PLAIN], e.line())
        }
    }
}

/// Handler for `GET /command`.
///
/// A `RESET` runs a full census, so the read is moved to the blocking pool.
#[instrument(skip(state))]
pub async fn read_report_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing GET /command request");

    let service = state.service.clone();
    match tokio::task::spawn_blocking(move || service.read_report()).await {
        Ok(report) => (StatusCode::OK, [TEXT_PLAIN], report),
        Err(e) => {
            error!("Report task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [TEXT_PLAIN],
                ChannelError::Unknown.line(),
            )
        }
    }
}
