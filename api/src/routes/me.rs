use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tonegate_core::identity::{Identity, PlanTier, QuotaWindow, WindowLimits};
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::plans::resolve_plan;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/me", get(get_me))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemainingQuota {
    pub minute: u32,
    pub day: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: String,
    pub plan: PlanTier,
    pub limits: WindowLimits,
    pub remaining: RemainingQuota,
}

/// Current plan, tier limits, and remaining quota for the signed-in user.
/// Reading does not consume quota.
#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Plan and quota for the caller", body = MeResponse),
        (status = 401, description = "No valid session", body = tonegate_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "account"
)]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MeResponse>, AppError> {
    let plan = resolve_plan(state.plans.as_ref(), &user.user_id, user.plan_claim).await;
    let identity = Identity::authenticated(user.user_id.clone(), plan);
    let limits = state.gateway.limits().for_identity(&identity);
    let ledger = state.gateway.ledger();

    let remaining = |window: QuotaWindow| {
        ledger
            .peek(&identity.quota_key(window), limits.for_window(window))
            .remaining
    };

    Ok(Json(MeResponse {
        user_id: user.user_id,
        plan,
        limits,
        remaining: RemainingQuota {
            minute: remaining(QuotaWindow::Minute),
            day: remaining(QuotaWindow::Day),
        },
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;

    use crate::test_support::{
        StubGenerator, StubReply, json_body, rewrite_payload, send, session_token, test_app,
        test_state,
    };

    fn me_request(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/v1/me");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).expect("request should build")
    }

    #[tokio::test]
    async fn anonymous_caller_is_unauthorized() {
        let app = test_app(test_state(StubGenerator::without_credential()));
        let response = send(&app, me_request(None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn reports_remaining_after_a_run() {
        let generator = StubGenerator::replying(StubReply::Payload(rewrite_payload()));
        let app = test_app(test_state(generator));
        let token = session_token("user_free", None);

        let run = Request::builder()
            .method("POST")
            .uri("/v1/run")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(json!({"input": "hello there"}).to_string()))
            .expect("request should build");
        assert_eq!(send(&app, run).await.status(), StatusCode::OK);

        let response = send(&app, me_request(Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["user_id"], "user_free");
        assert_eq!(body["plan"], "free");
        assert_eq!(body["limits"]["per_minute"], 10);
        assert_eq!(body["remaining"]["minute"], 9);
        assert_eq!(body["remaining"]["day"], 49);

        // Peeking is free.
        let again = json_body(send(&app, me_request(Some(&token))).await).await;
        assert_eq!(again["remaining"]["minute"], 9);
    }

    #[tokio::test]
    async fn stored_plan_overrides_token_claim() {
        let state = test_state(StubGenerator::without_credential());
        state
            .plans
            .set_plan("user_up", tonegate_core::identity::PlanTier::Pro)
            .await
            .expect("plan write");
        let app = test_app(state);

        let body = json_body(send(&app, me_request(Some(&session_token("user_up", None)))).await).await;
        assert_eq!(body["plan"], "pro");
        assert_eq!(body["limits"]["per_day"], 1000);
    }
}
