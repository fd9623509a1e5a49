//! Subscription checkout and payment-provider webhook verification.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use url::Url;

use crate::config::BillingConfig;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com";
/// Accepted clock skew between the signature timestamp and now.
pub const WEBHOOK_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CheckoutSession {
    /// Hosted checkout page to redirect the user to
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("billing provider unreachable: {0}")]
    Transport(String),
    #[error("billing provider response missing checkout url")]
    MissingUrl,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn create_checkout_session(&self, user_id: &str) -> Result<CheckoutSession, BillingError>;
}

pub struct StripeBilling {
    http: reqwest::Client,
    api_base: Url,
    secret_key: String,
    price_id: String,
    success_url: Url,
    cancel_url: Url,
}

impl StripeBilling {
    pub fn new(config: &BillingConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: Url::parse(STRIPE_API_BASE)?,
            secret_key: config.secret_key.clone(),
            price_id: config.price_id.clone(),
            success_url: app_page(&config.app_url, "billing/success"),
            cancel_url: app_page(&config.app_url, "billing/cancel"),
        })
    }

    fn checkout_form<'a>(&'a self, user_id: &'a str) -> Vec<(&'static str, &'a str)> {
        vec![
            ("mode", "subscription"),
            ("line_items[0][price]", self.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", self.success_url.as_str()),
            ("cancel_url", self.cancel_url.as_str()),
            ("client_reference_id", user_id),
            ("metadata[user_id]", user_id),
        ]
    }
}

/// `{app_url}/{page}`, keeping any path prefix the app is mounted under.
fn app_page(app_url: &Url, page: &str) -> Url {
    let mut url = app_url.clone();
    let prefix = app_url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{prefix}/{page}"));
    url
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutResponse {
    #[serde(default)]
    url: Option<String>,
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn create_checkout_session(&self, user_id: &str) -> Result<CheckoutSession, BillingError> {
        let endpoint = self
            .api_base
            .join("/v1/checkout/sessions")
            .map_err(|err| BillingError::Transport(err.to_string()))?;

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.secret_key)
            .form(&self.checkout_form(user_id))
            .send()
            .await
            .map_err(|err| BillingError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let session = response
            .json::<StripeCheckoutResponse>()
            .await
            .map_err(|err| BillingError::Transport(err.to_string()))?;
        session
            .url
            .map(|url| CheckoutSession { url })
            .ok_or(BillingError::MissingUrl)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature header has no v1 signature")]
    MissingSignature,
    #[error("signature timestamp is outside the tolerance window")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
/// against the raw request body. The signed message is `"{t}.{body}"`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    if now_unix.abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let matches = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        signed_mac(secret, timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });
    if matches {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// User to upgrade, when this is a completed checkout tagged with one.
    pub fn upgraded_user(&self) -> Option<&str> {
        if self.event_type != "checkout.session.completed" {
            return None;
        }
        self.data
            .object
            .get("metadata")?
            .get("user_id")?
            .as_str()
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
pub(crate) fn sign_for_test(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mac = signed_mac(secret, timestamp, payload).expect("hmac accepts any key length");
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SECRET: &str = "whsec_unit";
    const NOW: i64 = 1_760_000_000;

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_for_test(SECRET, NOW, payload);
        assert_eq!(verify_webhook_signature(payload, &header, SECRET, NOW + 10), Ok(()));
    }

    #[test]
    fn any_matching_v1_entry_is_accepted() {
        let payload = b"{}";
        let good = sign_for_test(SECRET, NOW, payload);
        let good_sig = good.split("v1=").nth(1).expect("signature present");
        let header = format!("t={NOW},v1=deadbeef,v1={good_sig}");
        assert_eq!(verify_webhook_signature(payload, &header, SECRET, NOW), Ok(()));
    }

    #[test]
    fn tampered_payload_or_wrong_secret_fails() {
        let header = sign_for_test(SECRET, NOW, b"{\"a\":1}");
        assert_eq!(
            verify_webhook_signature(b"{\"a\":2}", &header, SECRET, NOW),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_webhook_signature(b"{\"a\":1}", &header, "whsec_other", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_or_malformed_headers_fail() {
        let header = sign_for_test(SECRET, NOW, b"{}");
        assert_eq!(
            verify_webhook_signature(b"{}", &header, SECRET, NOW + WEBHOOK_TOLERANCE_SECS as i64 + 1),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify_webhook_signature(b"{}", "v1=abc", SECRET, NOW),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verify_webhook_signature(b"{}", &format!("t={NOW}"), SECRET, NOW),
            Err(SignatureError::MissingSignature)
        );
    }

    #[test]
    fn extreme_timestamps_are_expired() {
        assert_eq!(
            verify_webhook_signature(b"{}", "t=-9223372036854775808,v1=00", SECRET, NOW),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify_webhook_signature(b"{}", "t=9223372036854775807,v1=00", SECRET, NOW),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn completed_checkout_names_user() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "type": "checkout.session.completed",
            "data": {"object": {"metadata": {"user_id": "user_9"}}}
        }))
        .expect("event should parse");
        assert_eq!(event.upgraded_user(), Some("user_9"));

        let other: WebhookEvent = serde_json::from_value(json!({
            "type": "invoice.paid",
            "data": {"object": {"metadata": {"user_id": "user_9"}}}
        }))
        .expect("event should parse");
        assert_eq!(other.upgraded_user(), None);
    }

    #[test]
    fn checkout_form_tags_user_and_price() {
        let billing = StripeBilling::new(&BillingConfig {
            secret_key: "sk_test".to_string(),
            price_id: "price_123".to_string(),
            app_url: Url::parse("https://tonegate.app").expect("valid url"),
        })
        .expect("billing should build");

        let form = billing.checkout_form("user_5");
        assert!(form.contains(&("mode", "subscription")));
        assert!(form.contains(&("line_items[0][price]", "price_123")));
        assert!(form.contains(&("metadata[user_id]", "user_5")));
        assert!(form.contains(&("success_url", "https://tonegate.app/billing/success")));
        assert!(form.contains(&("cancel_url", "https://tonegate.app/billing/cancel")));
    }

    #[test]
    fn billing_pages_keep_app_path_prefix() {
        let billing = StripeBilling::new(&BillingConfig {
            secret_key: "sk_test".to_string(),
            price_id: "price_123".to_string(),
            app_url: Url::parse("https://example.com/tonegate/").expect("valid url"),
        })
        .expect("billing should build");

        assert_eq!(
            billing.success_url.as_str(),
            "https://example.com/tonegate/billing/success"
        );
        assert_eq!(
            billing.cancel_url.as_str(),
            "https://example.com/tonegate/billing/cancel"
        );
    }
}
