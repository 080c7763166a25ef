//! Event ingestion handler.
//!
//! Decodes a CloudEvent from an HTTP request in binary or structured mode
//! and passes it to the registered [`EventHandler`].

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use cecli_core::{binding, EventError, EventHandler};
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code name, e.g. `invalid_format`
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Receives one event.
///
/// Responds 400 without invoking the handler when the request is not a
/// valid CloudEvent. Otherwise the handler runs exactly once and the response
/// is 200 whatever it returns; handler errors are only logged.
#[instrument(
    name = "ingest_event",
    skip_all,
    fields(
        content_length = body.len(),
        content_type = headers.get("content-type").and_then(|v| v.to_str().ok()).unwrap_or("none"),
    )
)]
pub async fn ingest_event(
    State(handler): State<Arc<dyn EventHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event = match binding::decode_request(&headers, body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejecting malformed event");
            return create_error_response(StatusCode::BAD_REQUEST, &e);
        },
    };

    let event_id = event.id().to_string();
    debug!(event_id = %event_id, event_type = event.event_type(), "event decoded");

    if let Err(e) = handler.handle_event(event).await {
        error!(event_id = %event_id, error = %e, "event handler failed");
    }

    StatusCode::OK.into_response()
}

fn create_error_response(status: StatusCode, error: &EventError) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            code: error.code().name().to_string(),
            message: error.message().to_string(),
        },
    };

    (status, Json(body)).into_response()
}
