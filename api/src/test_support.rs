//! Shared fakes for router and pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use serde_json::{Value, json};
use tonegate_core::identity::TierLimits;
use tonegate_core::quota::QuotaLedger;
use tower::ServiceExt;

use crate::auth::SessionVerifier;
use crate::billing::{BillingError, BillingProvider, CheckoutSession};
use crate::gateway::Gateway;
use crate::generation::{GenerationClient, GenerationError, GenerationRequest};
use crate::plans::InMemoryPlanStore;
use crate::state::AppState;

pub const SESSION_SECRET: &str = "test-session-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Debug, Clone)]
pub enum StubReply {
    Payload(Value),
    Status(u16, String),
    Undecodable,
}

pub struct StubGenerator {
    reply: StubReply,
    credential: bool,
    pub calls: AtomicUsize,
    last: Mutex<Option<GenerationRequest>>,
}

impl StubGenerator {
    pub fn replying(reply: StubReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            credential: true,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn without_credential() -> Arc<Self> {
        Arc::new(Self {
            reply: StubReply::Undecodable,
            credential: false,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last.lock().expect("stub lock").clone()
    }
}

#[async_trait]
impl GenerationClient for StubGenerator {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().expect("stub lock") = Some(request.clone());
        match &self.reply {
            StubReply::Payload(value) => Ok(value.clone()),
            StubReply::Status(status, body) => Err(GenerationError::Status {
                status: *status,
                body: body.clone(),
            }),
            StubReply::Undecodable => Err(GenerationError::Decode("expected value".to_string())),
        }
    }
}

pub struct StubBilling {
    pub checkouts: Mutex<Vec<String>>,
}

#[async_trait]
impl BillingProvider for StubBilling {
    async fn create_checkout_session(&self, user_id: &str) -> Result<CheckoutSession, BillingError> {
        self.checkouts
            .lock()
            .expect("stub lock")
            .push(user_id.to_string());
        Ok(CheckoutSession {
            url: format!("https://checkout.test/session/{user_id}"),
        })
    }
}

/// A Responses payload carrying a valid rewrite object.
pub fn rewrite_payload() -> Value {
    let text = json!({
        "polite": "Could you send the report?",
        "neutral": "Send the report.",
        "warm": "Would love the report when you get a chance!"
    })
    .to_string();
    json!({
        "output": [{
            "type": "message",
            "content": [{ "type": "output_text", "text": text }]
        }]
    })
}

pub fn test_state(generator: Arc<dyn GenerationClient>) -> AppState {
    let gateway = Gateway::new(
        Arc::new(QuotaLedger::new()),
        TierLimits::default(),
        generator,
    );
    AppState {
        gateway: Arc::new(gateway),
        plans: Arc::new(InMemoryPlanStore::new()),
        sessions: Some(Arc::new(SessionVerifier::new(SESSION_SECRET, None))),
        billing: None,
        webhook_secret: Some(Arc::from(WEBHOOK_SECRET)),
        trust_proxy_headers: true,
        redact_diagnostics: false,
    }
}

pub fn test_app(state: AppState) -> Router {
    crate::routes::router(state)
}

pub fn session_token(user_id: &str, plan: Option<&str>) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    let mut claims = json!({ "sub": user_id, "exp": exp });
    if let Some(plan) = plan {
        claims["public_metadata"] = json!({ "plan": plan });
    }
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SESSION_SECRET.as_bytes()),
    )
    .expect("token should encode")
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone()
        .oneshot(request)
        .await
        .expect("request should succeed")
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be json")
}
