use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::ServerError;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Largest request body read into memory; bigger bodies get 413.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024; // 2 MiB

/// Request bodies up to this size are logged verbatim at debug level.
const LOGGED_BODY_LIMIT: usize = 1024;

/// Tag each request with a trace ID and log its start and completion.
///
/// An incoming `x-trace-id` is honoured when it is a valid UUID. Only the
/// request body is buffered; responses pass through untouched so streamed
/// replies reach the client as they are produced.
pub async fn trace_middleware(req: Request, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let header_value = HeaderValue::from_str(&trace_id.to_string()).ok();

        let (mut parts, body) = req.into_parts();
        let mut response = match buffer_and_log(&parts.headers, body).await {
            Ok(bytes) => {
                if let Some(v) = &header_value {
                    parts.headers.insert(X_TRACE_ID, v.clone());
                }
                next.run(Request::from_parts(parts, Body::from(bytes))).await
            }
            Err(e) => e.into_response(),
        };

        if let Some(v) = header_value {
            response.headers_mut().insert(X_TRACE_ID, v);
        }
        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response started"
        );
        response
    }
    .instrument(span)
    .await
}

/// Read the request body, at most [`MAX_BODY_BYTES`] of it.
async fn buffer_and_log(headers: &header::HeaderMap, body: Body) -> Result<Bytes, ServerError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(limit = MAX_BODY_BYTES, "request body too large");
            return Err(ServerError::PayloadTooLarge { limit: MAX_BODY_BYTES });
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Err(ServerError::invalid("body", "failed to read request body"));
        }
    };

    if content_type.contains("application/json") && bytes.len() < LOGGED_BODY_LIMIT {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            debug!(body = %text, "request body");
        }
    } else if !bytes.is_empty() {
        debug!(content_type, size = bytes.len(), "request body skipped");
    }
    Ok(bytes)
}
