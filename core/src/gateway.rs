//! Pure stages of the generation gateway and its error taxonomy.
//!
//! The async orchestration (quota admission, dispatch) lives in the API
//! crate; everything here is deterministic and I/O free.

use serde_json::Value;

use crate::catalog::Mode;
use crate::error::codes;
use crate::identity::QuotaWindow;
use crate::outputs::ModeOutput;

pub const MAX_INPUT_CHARS: usize = 6000;
pub const MIN_INPUT_CHARS: usize = 3;
/// Output cap sent with every generation request.
pub const MAX_OUTPUT_UNITS: u32 = 450;

/// Every way a gateway request can fail. All variants are terminal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("input must be at least 3 characters after trimming (got {actual})")]
    InputTooShort { actual: usize },
    #[error("invalid mode '{mode}'")]
    InvalidMode {
        mode: String,
        suggestion: Option<&'static str>,
    },
    #[error("rate limited on the {} window; retry in {retry_after_ms} ms", .window.as_str())]
    RateLimited {
        window: QuotaWindow,
        retry_after_ms: u64,
        limit: u32,
    },
    #[error("generation credential is not configured")]
    MissingCredential,
    #[error("generation service error: {diagnostic}")]
    UpstreamError { diagnostic: String },
    #[error("generation service returned no output text")]
    EmptyOutput,
    #[error("generation service returned non-JSON output")]
    NonJsonOutput { raw: String },
    #[error("generation output violates the {mode} contract: {detail}")]
    SchemaViolation {
        mode: Mode,
        detail: String,
        raw: String,
    },
    #[error("{message}")]
    Unknown { message: String },
}

impl GatewayError {
    /// Machine-readable code used in error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InputTooShort { .. } => codes::INPUT_TOO_SHORT,
            GatewayError::InvalidMode { .. } => codes::INVALID_MODE,
            GatewayError::RateLimited { .. } => codes::RATE_LIMITED,
            GatewayError::MissingCredential => codes::MISSING_CONFIGURATION,
            GatewayError::UpstreamError { .. } => codes::UPSTREAM_ERROR,
            GatewayError::EmptyOutput => codes::EMPTY_OUTPUT,
            GatewayError::NonJsonOutput { .. } => codes::NON_JSON_OUTPUT,
            GatewayError::SchemaViolation { .. } => codes::SCHEMA_VIOLATION,
            GatewayError::Unknown { .. } => codes::INTERNAL_ERROR,
        }
    }
}

/// Trim, then silently cut to [`MAX_INPUT_CHARS`] characters.
///
/// Trailing whitespace exposed by the cut is trimmed as well, so normalizing
/// an already-normalized string is a no-op.
pub fn normalize_input(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(MAX_INPUT_CHARS) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Normalize and enforce the minimum length.
pub fn validated_input(raw: &str) -> Result<String, GatewayError> {
    let input = normalize_input(raw);
    let actual = input.chars().count();
    if actual < MIN_INPUT_CHARS {
        return Err(GatewayError::InputTooShort { actual });
    }
    Ok(input)
}

/// Parse extracted text as a JSON object and check it against the mode's
/// contract. Returns the parsed object verbatim on success.
pub fn parse_output(mode: Mode, text: &str) -> Result<Value, GatewayError> {
    let value = serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
        .ok_or_else(|| GatewayError::NonJsonOutput {
            raw: text.to_string(),
        })?;

    ModeOutput::decode(mode, &value).map_err(|err| GatewayError::SchemaViolation {
        mode,
        detail: err.to_string(),
        raw: text.to_string(),
    })?;

    Ok(value)
}
