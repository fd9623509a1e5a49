use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tonegate_core::catalog::Mode;
use utoipa::ToSchema;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Mode identifiers accepted by `POST /v1/run`
    pub modes: Vec<Mode>,
}

/// Liveness plus the supported mode list. Makes no outbound calls.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        modes: state.gateway.catalog().modes().collect(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    use crate::test_support::{StubGenerator, json_body, send, test_app, test_state};

    #[tokio::test]
    async fn lists_modes() {
        let app = test_app(test_state(StubGenerator::without_credential()));
        let response = send(
            &app,
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(
            body["modes"],
            serde_json::json!(["rewrite", "urgent", "send_check"])
        );
    }
}
