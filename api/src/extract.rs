//! Extractors that turn axum rejections into structured `AppError` bodies.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use crate::error::AppError;

/// `axum::Json` replacement: a malformed or mistyped body becomes a
/// `validation_failed` error instead of axum's plain-text 4xx.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

pub fn map_json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();
    let field = field_from_serde_message(&body_text).unwrap_or_else(|| "body".to_string());

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field),
        received: None,
        docs_hint: Some(
            "Send a JSON object like {\"input\": \"...\", \"mode\": \"rewrite\"} with Content-Type: application/json."
                .to_string(),
        ),
    }
}

/// Pull the field name out of serde's "missing field `x`" / "unknown field `x`"
/// messages, or the `x: ...` path prefix axum adds for type mismatches.
fn field_from_serde_message(msg: &str) -> Option<String> {
    for marker in ["missing field `", "unknown field `"] {
        if let Some(start) = msg.find(marker) {
            let after = &msg[start + marker.len()..];
            if let Some(end) = after.find('`') {
                return Some(after[..end].to_string());
            }
        }
    }

    let (_, detail) = msg.split_once("target type: ")?;
    let (path, _) = detail.split_once(": ")?;
    path.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        .then(|| path.to_string())
        .filter(|path| !path.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn extracts_missing_field_name() {
        let msg = "Failed to deserialize: missing field `input` at line 1 column 2";
        assert_eq!(field_from_serde_message(msg), Some("input".to_string()));
    }

    #[test]
    fn extracts_unknown_field_name() {
        let msg = "unknown field `foo`, expected `input` or `mode`";
        assert_eq!(field_from_serde_message(msg), Some("foo".to_string()));
    }

    #[test]
    fn extracts_type_mismatch_path() {
        let msg = "Failed to deserialize the JSON body into the target type: mode: invalid type: integer `4`, expected a string at line 1 column 11";
        assert_eq!(field_from_serde_message(msg), Some("mode".to_string()));
    }

    #[test]
    fn returns_none_for_generic_error() {
        assert_eq!(field_from_serde_message("EOF while parsing a value"), None);
    }

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct Probe {
        input: String,
    }

    async fn probe(AppJson(_body): AppJson<Probe>) -> StatusCode {
        StatusCode::OK
    }

    #[tokio::test]
    async fn malformed_body_becomes_validation_error() {
        let app = Router::new().route("/probe", post(probe));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/probe")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"input\": "))
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed")
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["error"], "validation_failed");
    }
}
