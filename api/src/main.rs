use std::net::SocketAddr;
use std::sync::Arc;

use tonegate_core::quota::QuotaLedger;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod billing;
mod config;
mod error;
mod extract;
mod gateway;
mod generation;
mod middleware;
mod plans;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tonegate API",
        version = "0.1.0",
        description = "Structured message rewriting, urgency triage, and send checks behind per-identity quotas."
    ),
    paths(
        routes::health::health_check,
        routes::run::run,
        routes::me::get_me,
        routes::billing::create_checkout,
        routes::billing::handle_webhook,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::run::RunRequest,
        routes::run::RunResponse,
        routes::me::MeResponse,
        routes::me::RemainingQuota,
        routes::billing::WebhookAck,
        billing::CheckoutSession,
        tonegate_core::error::ApiError,
        tonegate_core::catalog::Mode,
        tonegate_core::identity::PlanTier,
        tonegate_core::identity::WindowLimits,
        tonegate_core::identity::QuotaWindow,
        tonegate_core::outputs::ModeOutput,
        tonegate_core::outputs::RewriteOutput,
        tonegate_core::outputs::UrgentOutput,
        tonegate_core::outputs::SendCheckOutput,
        tonegate_core::outputs::RiskLevel,
        tonegate_core::outputs::Recommendation,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tonegate_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration; refusing to start");
            std::process::exit(1);
        }
    };

    let generator = generation::OpenAiResponsesClient::new(&config.generation)
        .expect("Failed to build generation client");

    let billing: Option<Arc<dyn billing::BillingProvider>> = match config.billing.as_ref() {
        Some(billing_config) => Some(Arc::new(
            billing::StripeBilling::new(billing_config).expect("Failed to build billing client"),
        )),
        None => None,
    };

    let ledger = Arc::new(QuotaLedger::new());
    gateway::spawn_quota_sweeper(Arc::clone(&ledger), config.quota_sweep_interval);

    let app_state = state::AppState {
        gateway: Arc::new(gateway::Gateway::new(
            ledger,
            config.tier_limits,
            Arc::new(generator),
        )),
        plans: Arc::new(plans::InMemoryPlanStore::new()),
        sessions: config.session.as_ref().map(|session| {
            Arc::new(auth::SessionVerifier::new(
                &session.secret,
                session.issuer.as_deref(),
            ))
        }),
        billing,
        webhook_secret: config.webhook_secret.as_deref().map(Arc::from),
        trust_proxy_headers: config.trust_proxy_headers,
        redact_diagnostics: config.redact_diagnostics,
    };

    let cors_layer = middleware::cors::build_cors_layer(config.cors_origins.as_deref());

    let app = routes::router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        %addr,
        model = %config.generation.model,
        anonymous_per_minute = config.tier_limits.anonymous.per_minute,
        billing = config.billing.is_some(),
        "Tonegate API listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/v1/run",
            "/v1/me",
            "/v1/billing/checkout",
            "/v1/billing/webhook",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing from openapi");
        }
    }

    #[test]
    fn openapi_documents_raw_webhook_body() {
        let doc = ApiDoc::openapi();
        let webhook = doc
            .paths
            .paths
            .get("/v1/billing/webhook")
            .and_then(|item| item.post.as_ref())
            .expect("webhook operation documented");
        let body = webhook
            .request_body
            .as_ref()
            .expect("webhook request body documented");
        assert!(body.content.contains_key("application/json"));
    }
}
