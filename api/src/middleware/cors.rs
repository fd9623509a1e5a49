use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::CorsLayer;

use crate::routes::run::QUOTA_HEADER_NAMES;

/// Build a CORS layer from a comma-separated origin list
/// (`TONEGATE_CORS_ORIGINS`, default `http://localhost:3000`).
///
/// Quota headers and `Retry-After` are exposed so browser clients can show
/// remaining budget.
pub fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .unwrap_or("http://localhost:3000")
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let mut exposed: Vec<HeaderName> = QUOTA_HEADER_NAMES
        .into_iter()
        .map(HeaderName::from_static)
        .collect();
    exposed.push(header::RETRY_AFTER);
    exposed.push(HeaderName::from_static("x-request-id"));

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers(exposed)
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    #[tokio::test]
    async fn allowed_origin_sees_quota_headers_exposed() {
        let app = Router::new()
            .route("/health", get(ok))
            .layer(super::build_cors_layer(Some("https://tonegate.app, https://www.tonegate.app")));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://www.tonegate.app")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        let headers = response.headers();
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .expect("allow-origin header should exist"),
            "https://www.tonegate.app"
        );
        let exposed = headers
            .get("access-control-expose-headers")
            .expect("expose-headers should exist")
            .to_str()
            .expect("ascii header")
            .to_ascii_lowercase();
        assert!(exposed.contains("x-ratelimit-1m-remaining"));
        assert!(exposed.contains("retry-after"));
    }

    #[tokio::test]
    async fn unknown_origin_gets_no_allow_header() {
        let app = Router::new()
            .route("/health", get(ok))
            .layer(super::build_cors_layer(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://evil.example")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        assert!(
            response
                .headers()
                .get("access-control-allow-origin")
                .is_none()
        );
    }
}
