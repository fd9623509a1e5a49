use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response returned by every failing endpoint.
/// `error` is stable and machine-readable; `message` is meant for people.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "invalid_mode", "rate_limited")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Quota window that denied the request ("minute" or "day")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    /// Milliseconds until the denying window resets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Raw text returned by the generation service (diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ApiError {
    pub fn new(error: &str, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            field: None,
            received: None,
            request_id: request_id.into(),
            docs_hint: None,
            window: None,
            retry_after_ms: None,
            raw: None,
        }
    }
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const INPUT_TOO_SHORT: &str = "input_too_short";
    pub const INVALID_MODE: &str = "invalid_mode";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const MISSING_CONFIGURATION: &str = "missing_configuration";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const EMPTY_OUTPUT: &str = "empty_output";
    pub const NON_JSON_OUTPUT: &str = "non_json_output";
    pub const SCHEMA_VIOLATION: &str = "schema_violation";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
