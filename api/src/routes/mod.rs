use axum::{Router, middleware as axum_middleware};

use crate::auth::InjectIdentityLayer;
use crate::middleware;
use crate::state::AppState;

pub mod billing;
pub mod health;
pub mod me;
pub mod run;

/// Every API route with identity injection, baseline headers, and request
/// ids applied. Transport concerns (tracing, CORS, docs) are added by `main`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(run::router())
        .merge(me::router())
        .merge(billing::router().layer(middleware::rate_limit::billing_layer()))
        .layer(InjectIdentityLayer::new(state.sessions.clone()))
        .layer(axum_middleware::from_fn(middleware::security_headers::apply))
        .layer(axum_middleware::from_fn(middleware::request_id::assign))
        .with_state(state)
}
