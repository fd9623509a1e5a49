use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tonegate_core::catalog::Mode;
use tonegate_core::error::{ApiError, codes};
use tonegate_core::gateway::GatewayError;

use crate::middleware::request_id;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Terminal outcome of the generation pipeline. `redact` hides raw model
    /// text and upstream diagnostics from the body.
    Gateway { error: GatewayError, redact: bool },
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or invalid session (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// A collaborator needed by this endpoint is not configured (500)
    MissingConfiguration { message: String },
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    pub fn gateway(error: GatewayError, redact: bool) -> Self {
        AppError::Gateway { error, redact }
    }

    pub fn unauthorized() -> Self {
        AppError::Unauthorized {
            message: "Sign in required".to_string(),
            docs_hint: Some(
                "Send a session token as 'Authorization: Bearer <token>'.".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = request_id::current();

        let (status, api_error, retry_after_secs) = match self {
            AppError::Gateway { error, redact } => gateway_response(error, redact, request_id),
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    field,
                    received,
                    docs_hint,
                    ..ApiError::new(codes::VALIDATION_FAILED, message, request_id)
                },
                None,
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    docs_hint,
                    ..ApiError::new(codes::UNAUTHORIZED, message, request_id)
                },
                None,
            ),
            AppError::MissingConfiguration { message } => {
                tracing::error!(message = %message, "missing configuration");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new(codes::MISSING_CONFIGURATION, message, request_id),
                    None,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new(
                        codes::INTERNAL_ERROR,
                        "An internal error occurred",
                        request_id,
                    ),
                    None,
                )
            }
        };

        let mut response = (status, Json(api_error)).into_response();
        if let Some(secs) = retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn gateway_response(
    error: GatewayError,
    redact: bool,
    request_id: String,
) -> (StatusCode, ApiError, Option<u64>) {
    let code = error.code();
    let message = error.to_string();
    match error {
        GatewayError::InputTooShort { actual } => (
            StatusCode::BAD_REQUEST,
            ApiError {
                field: Some("input".to_string()),
                received: Some(serde_json::json!(actual)),
                docs_hint: Some("Send at least 3 non-whitespace characters.".to_string()),
                ..ApiError::new(code, message, request_id)
            },
            None,
        ),
        GatewayError::InvalidMode { mode, suggestion } => {
            let known: Vec<&str> = Mode::ALL.iter().map(|m| m.as_str()).collect();
            let docs_hint = match suggestion {
                Some(s) => format!("Did you mean '{s}'? Valid modes: {}.", known.join(", ")),
                None => format!("Valid modes: {}.", known.join(", ")),
            };
            (
                StatusCode::BAD_REQUEST,
                ApiError {
                    field: Some("mode".to_string()),
                    received: Some(serde_json::Value::String(mode)),
                    docs_hint: Some(docs_hint),
                    ..ApiError::new(code, message, request_id)
                },
                None,
            )
        }
        GatewayError::RateLimited {
            window,
            retry_after_ms,
            limit,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            ApiError {
                window: Some(window.as_str().to_string()),
                retry_after_ms: Some(retry_after_ms),
                docs_hint: Some(format!(
                    "Limit is {limit} requests per {}. Sign in or upgrade for a higher limit.",
                    window.as_str()
                )),
                ..ApiError::new(code, message, request_id)
            },
            Some(retry_after_ms.div_ceil(1000)),
        ),
        GatewayError::MissingCredential => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new(code, message, request_id),
            None,
        ),
        GatewayError::UpstreamError { .. } if redact => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new(code, "generation service error", request_id),
            None,
        ),
        GatewayError::UpstreamError { .. } | GatewayError::EmptyOutput => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new(code, message, request_id),
            None,
        ),
        GatewayError::NonJsonOutput { raw } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError {
                raw: (!redact).then_some(raw),
                ..ApiError::new(code, message, request_id)
            },
            None,
        ),
        GatewayError::SchemaViolation { raw, .. } => {
            let message = if redact {
                "generation output does not match the mode contract".to_string()
            } else {
                message
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError {
                    raw: (!redact).then_some(raw),
                    ..ApiError::new(code, message, request_id)
                },
                None,
            )
        }
        GatewayError::Unknown { message } => {
            tracing::error!(message = %message, "unclassified gateway failure");
            let message = if redact {
                "An internal error occurred".to_string()
            } else {
                message
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new(code, message, request_id),
                None,
            )
        }
    }
}
