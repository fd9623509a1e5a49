use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Assign every request an id (an incoming `x-request-id` is reused), echo it
/// on the response, and make it visible to error bodies via [`current`].
pub async fn assign(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    let mut response = REQUEST_ID.scope(request_id.clone(), next.run(req)).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Id of the request being served, or a fresh one outside [`assign`].
pub fn current() -> String {
    REQUEST_ID
        .try_with(Clone::clone)
        .unwrap_or_else(|_| uuid::Uuid::now_v7().to_string())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::{Router, middleware};
    use tower::ServiceExt;

    async fn echo() -> String {
        super::current()
    }

    fn app() -> Router {
        Router::new()
            .route("/echo", get(echo))
            .layer(middleware::from_fn(super::assign))
    }

    #[tokio::test]
    async fn incoming_id_is_reused_and_echoed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header("x-request-id", "req-abc")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .expect("x-request-id header should exist"),
            "req-abc"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        assert_eq!(&body[..], b"req-abc");
    }

    #[tokio::test]
    async fn missing_id_is_generated_and_matches_handler_view() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        let header = response
            .headers()
            .get("x-request-id")
            .expect("x-request-id header should exist")
            .to_str()
            .expect("header should be ascii")
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        assert_eq!(body, header.as_bytes());
        assert!(uuid::Uuid::parse_str(&header).is_ok());
    }
}
