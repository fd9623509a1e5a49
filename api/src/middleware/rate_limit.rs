//! Per-IP flood guard for the billing endpoints.
//!
//! Generation quota is enforced by the gateway's own ledger; this layer only
//! keeps the checkout and webhook routes from being hammered.

use axum::http::{HeaderValue, Response, StatusCode, header};
use tonegate_core::error::{ApiError, codes};
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};

use crate::middleware::request_id;

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

/// 30 requests/minute per IP with a burst of 10.
pub fn billing_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(10)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for billing"),
    )
    .error_handler(json_error_handler)
}

/// Render governor rejections in the same `ApiError` shape as every other
/// failure, with `Retry-After` on 429s.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let request_id = request_id::current();
    let (status, retry_after_secs, body) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            ApiError {
                retry_after_ms: Some(wait_time.saturating_mul(1000)),
                ..ApiError::new(
                    codes::RATE_LIMITED,
                    format!("Too many requests. Retry after {wait_time} seconds."),
                    request_id,
                )
            },
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            ApiError::new(
                codes::INTERNAL_ERROR,
                "Unable to determine client identity for rate limiting",
                request_id,
            ),
        ),
        GovernorError::Other { code, msg, .. } => (
            code,
            None,
            ApiError::new(
                codes::INTERNAL_ERROR,
                msg.unwrap_or_default(),
                request_id,
            ),
        ),
    };

    let json = serde_json::to_vec(&body).unwrap_or_default();
    let mut response = Response::new(axum::body::Body::from(json));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(secs) = retry_after_secs {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}
