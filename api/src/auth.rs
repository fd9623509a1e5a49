use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tonegate_core::identity::{Identity, PlanTier};
use tower::{Layer, Service};

use crate::error::AppError;
use crate::plans::resolve_plan;
use crate::state::AppState;

/// Caller proven by a valid session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    /// Plan carried in the token's public metadata, if any.
    pub plan_claim: Option<PlanTier>,
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    public_metadata: Option<PublicMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct PublicMetadata {
    #[serde(default)]
    plan: Option<String>,
}

/// HS256 session-token verifier. `exp` is required; `iss` is checked when an
/// issuer is configured.
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, jsonwebtoken::errors::Error> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.key, &self.validation)?;
        let claims = data.claims;
        let plan_claim = claims
            .public_metadata
            .and_then(|metadata| metadata.plan)
            .map(|plan| PlanTier::from_metadata(Some(&plan)));
        Ok(AuthenticatedUser {
            user_id: claims.sub,
            plan_claim,
        })
    }
}

// --- Tower Layer/Service for identity injection ---

/// Injects `AuthenticatedUser` into request extensions when the bearer token
/// verifies. Invalid or absent tokens fall through as anonymous.
#[derive(Clone)]
pub struct InjectIdentityLayer {
    sessions: Option<Arc<SessionVerifier>>,
}

impl InjectIdentityLayer {
    pub fn new(sessions: Option<Arc<SessionVerifier>>) -> Self {
        Self { sessions }
    }
}

impl<S> Layer<S> for InjectIdentityLayer {
    type Service = InjectIdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectIdentityService {
            inner,
            sessions: self.sessions.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InjectIdentityService<S> {
    inner: S,
    sessions: Option<Arc<SessionVerifier>>,
}

impl<S> Service<Request> for InjectIdentityService<S>
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    type Response = Response;
    type Error = Infallible;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let verified = match (&self.sessions, bearer_token(req.headers())) {
            (Some(sessions), Some(token)) => Some(sessions.verify(token)),
            _ => None,
        };
        match verified {
            Some(Ok(user)) => {
                req.extensions_mut().insert(user);
            }
            Some(Err(err)) => {
                tracing::debug!(error = %err, "session token rejected; continuing as anonymous")
            }
            None => {}
        }
        self.inner.call(req)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Best-effort client address: last `X-Forwarded-For` hop, then
/// `X-Real-IP` (both only when proxy headers are trusted), then the socket
/// peer, then `"unknown"`.
///
/// The last hop is the one the trusted proxy appended; anything to its left
/// is client-supplied.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let proxied = trust_proxy
        .then(|| {
            header("x-forwarded-for")
                .and_then(|value| value.rsplit(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .or_else(|| header("x-real-ip"))
        })
        .flatten();

    match (proxied, peer) {
        (Some(address), _) => address.to_string(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

// --- Extractors (used by handlers) ---

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(AppError::unauthorized)
    }
}

/// Resolved requester for quota purposes. Never rejects: callers without a
/// valid session are identified by address.
#[derive(Debug, Clone)]
pub struct RequestIdentity(pub Identity);

impl FromRequestParts<AppState> for RequestIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            let plan = resolve_plan(state.plans.as_ref(), &user.user_id, user.plan_claim).await;
            return Ok(RequestIdentity(Identity::authenticated(user.user_id, plan)));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(RequestIdentity(Identity::anonymous(client_address(
            &parts.headers,
            peer,
            state.trust_proxy_headers,
        ))))
    }
}
