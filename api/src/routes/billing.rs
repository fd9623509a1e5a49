use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tonegate_core::identity::PlanTier;
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::billing::{CheckoutSession, WebhookEvent, verify_webhook_signature};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/billing/checkout", post(create_checkout))
        .route("/v1/billing/webhook", post(handle_webhook))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Start a Pro subscription checkout for the signed-in user
#[utoipa::path(
    post,
    path = "/v1/billing/checkout",
    responses(
        (status = 200, description = "Hosted checkout URL", body = CheckoutSession),
        (status = 401, description = "No valid session", body = tonegate_core::error::ApiError),
        (status = 500, description = "Billing not configured or provider failure", body = tonegate_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "billing"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<CheckoutSession>, AppError> {
    let billing = state
        .billing
        .as_ref()
        .ok_or_else(|| AppError::MissingConfiguration {
            message: "Billing is not configured".to_string(),
        })?;

    let session = billing
        .create_checkout_session(&user.user_id)
        .await
        .map_err(|err| AppError::Internal(format!("checkout session failed: {err}")))?;

    tracing::info!(user_id = %user.user_id, "checkout session created");
    Ok(Json(session))
}

/// Payment-provider webhook. Verifies the signature over the raw body and
/// upgrades the user named in a completed checkout.
#[utoipa::path(
    post,
    path = "/v1/billing/webhook",
    request_body(
        content = String,
        content_type = "application/json",
        description = "Raw provider event, verified against Stripe-Signature"
    ),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature", body = tonegate_core::error::ApiError),
        (status = 500, description = "Webhook secret not configured", body = tonegate_core::error::ApiError)
    ),
    tag = "billing"
)]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| signature_error("Missing Stripe-Signature header"))?;

    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::MissingConfiguration {
            message: "Webhook secret is not configured".to_string(),
        })?;

    verify_webhook_signature(&body, signature, secret, chrono::Utc::now().timestamp()).map_err(
        |err| {
            tracing::warn!(error = %err, "webhook signature rejected");
            signature_error(&format!("Invalid webhook signature: {err}"))
        },
    )?;

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|err| AppError::Validation {
        message: format!("Invalid webhook payload: {err}"),
        field: Some("body".to_string()),
        received: None,
        docs_hint: None,
    })?;

    if let Some(user_id) = event.upgraded_user() {
        state
            .plans
            .set_plan(user_id, PlanTier::Pro)
            .await
            .map_err(|err| AppError::Internal(format!("plan update failed: {err}")))?;
        tracing::info!(user_id = %user_id, "plan upgraded to pro");
    } else {
        tracing::debug!(event_type = %event.event_type, "webhook event ignored");
    }

    Ok(Json(WebhookAck { received: true }))
}

fn signature_error(message: &str) -> AppError {
    AppError::Validation {
        message: message.to_string(),
        field: Some("stripe-signature".to_string()),
        received: None,
        docs_hint: None,
    }
}
