use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tonegate_core::catalog::Mode;
use utoipa::ToSchema;

use crate::auth::RequestIdentity;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::gateway::QuotaStatus;
use crate::state::AppState;

/// Quota headers on every successful run, in `limit`/`remaining` pairs per
/// window.
pub const QUOTA_HEADER_NAMES: [&str; 4] = [
    "x-ratelimit-1m-limit",
    "x-ratelimit-1m-remaining",
    "x-ratelimit-1d-limit",
    "x-ratelimit-1d-remaining",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/run", post(run))
        .route("/api/run", post(run))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RunRequest {
    /// Text to transform. Trimmed and cut to 6000 characters; at least 3
    /// characters must remain.
    #[serde(default)]
    pub input: String,
    /// One of `rewrite`, `urgent`, `send_check`. Defaults to `rewrite`.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunResponse {
    /// JSON object matching the requested mode's contract
    #[schema(value_type = Object)]
    pub result: Value,
}

/// Run one generation request
#[utoipa::path(
    post,
    path = "/v1/run",
    request_body = RunRequest,
    responses(
        (status = 200, description = "Generated result; quota in X-RateLimit-* headers", body = RunResponse),
        (status = 400, description = "Input too short, unknown mode, or malformed body", body = tonegate_core::error::ApiError),
        (status = 429, description = "Quota exhausted; see Retry-After", body = tonegate_core::error::ApiError),
        (status = 500, description = "Missing configuration or generation failure", body = tonegate_core::error::ApiError)
    ),
    security((), ("bearer_auth" = [])),
    tag = "generation"
)]
pub async fn run(
    State(state): State<AppState>,
    RequestIdentity(identity): RequestIdentity,
    AppJson(req): AppJson<RunRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mode_id = req.mode.as_deref().unwrap_or(Mode::DEFAULT.as_str());

    let success = state
        .gateway
        .handle(&req.input, mode_id, &identity)
        .await
        .map_err(|err| AppError::gateway(err, state.redact_diagnostics))?;

    Ok((
        quota_headers(&success.quota),
        Json(RunResponse {
            result: success.result,
        }),
    ))
}

fn quota_headers(quota: &QuotaStatus) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (window, decision) in quota.windows() {
        let label = window.header_label();
        for (suffix, value) in [("limit", decision.limit()), ("remaining", decision.remaining())] {
            if let Ok(name) = HeaderName::try_from(format!("x-ratelimit-{label}-{suffix}")) {
                headers.insert(name, HeaderValue::from(value));
            }
        }
    }
    headers
}
