//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become an [`ErrorBody`] JSON
//! response with an appropriate status code.
//!
//! Provider failures are logged with full detail; the caller only ever sees
//! a fixed message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use campus_chat_types::{ErrorBody, FieldError};
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::completion::ProviderError;

/// Shown for any provider failure on the non-streaming path.
pub const PROVIDER_FAILURE_MESSAGE: &str = "Failed to get AI response. Please try again.";

/// In-band error text for a streamed reply that could not be completed.
pub const STREAM_FAILURE_MESSAGE: &str = "Failed to stream response";

/// All errors that can occur in the campus-chat-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request body failed to parse or validate.
    #[error("invalid request data ({} field errors)", .0.len())]
    Validation(Vec<FieldError>),

    /// The completion provider failed before a reply was produced.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The request body exceeded the relay's size bound.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl ServerError {
    /// A validation failure on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServerError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                ErrorBody { error: "Invalid request data".to_owned(), details },
            ),
            ServerError::Provider(e) => {
                error!(error = %e, "completion provider error");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody { error: PROVIDER_FAILURE_MESSAGE.to_owned(), details: Vec::new() },
                )
            }
            ServerError::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    error: format!("Request body exceeds the {} KiB limit", limit / 1024),
                    details: Vec::new(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationErrors> for ServerError {
    fn from(errors: ValidationErrors) -> Self {
        let mut details: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = camel_case(&field);
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    FieldError::new(field.clone(), message)
                })
            })
            .collect();
        // HashMap order is arbitrary.
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ServerError::Validation(details)
    }
}

/// `conversation_history` → `conversationHistory`, matching the wire names.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────
