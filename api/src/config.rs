use std::time::Duration;

use tonegate_core::identity::{Tier, TierLimits};
use url::Url;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_QUOTA_SWEEP_SECS: u64 = 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub secret_key: String,
    pub price_id: String,
    pub app_url: Url,
}

/// Process configuration, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub generation: GenerationConfig,
    pub session: Option<SessionConfig>,
    pub trust_proxy_headers: bool,
    pub cors_origins: Option<String>,
    pub redact_diagnostics: bool,
    pub quota_sweep_interval: Duration,
    pub tier_limits: TierLimits,
    pub billing: Option<BillingConfig>,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing {
            var: "OPENAI_API_KEY",
        })?;

        let base_url = parse_url(
            "TONEGATE_OPENAI_BASE_URL",
            &get("TONEGATE_OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        )?;

        let generation = GenerationConfig {
            api_key,
            model: get("TONEGATE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url,
            timeout: Duration::from_secs(parse_or(
                "TONEGATE_GENERATION_TIMEOUT_SECS",
                get("TONEGATE_GENERATION_TIMEOUT_SECS"),
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )?),
        };

        let session = get("TONEGATE_SESSION_SECRET").map(|secret| SessionConfig {
            secret,
            issuer: get("TONEGATE_SESSION_ISSUER"),
        });
        if session.is_none() {
            tracing::warn!("TONEGATE_SESSION_SECRET not set; every request is treated as anonymous");
        }

        let billing = match (
            get("STRIPE_SECRET_KEY"),
            get("STRIPE_PRICE_ID"),
            get("APP_URL"),
        ) {
            (Some(secret_key), Some(price_id), Some(app_url)) => Some(BillingConfig {
                secret_key,
                price_id,
                app_url: parse_url("APP_URL", &app_url)?,
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!(
                    "billing disabled: STRIPE_SECRET_KEY, STRIPE_PRICE_ID and APP_URL must all be set"
                );
                None
            }
        };

        Ok(Self {
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            generation,
            session,
            trust_proxy_headers: parse_bool("TONEGATE_TRUST_PROXY_HEADERS", get("TONEGATE_TRUST_PROXY_HEADERS"), false)?,
            cors_origins: get("TONEGATE_CORS_ORIGINS"),
            redact_diagnostics: parse_bool("TONEGATE_REDACT_DIAGNOSTICS", get("TONEGATE_REDACT_DIAGNOSTICS"), false)?,
            quota_sweep_interval: Duration::from_secs(
                parse_or(
                    "TONEGATE_QUOTA_SWEEP_SECS",
                    get("TONEGATE_QUOTA_SWEEP_SECS"),
                    DEFAULT_QUOTA_SWEEP_SECS,
                )?
                .max(1),
            ),
            tier_limits: tier_limits_from(&get),
            billing,
            webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
        })
    }
}

/// Apply `TONEGATE_LIMIT_<TIER>_<WINDOW>` overrides on top of the defaults.
/// Unparseable or zero values keep the default.
fn tier_limits_from(get: &dyn Fn(&str) -> Option<String>) -> TierLimits {
    let mut limits = TierLimits::default();
    for (tier, prefix) in [
        (Tier::Anonymous, "ANON"),
        (Tier::Free, "FREE"),
        (Tier::Pro, "PRO"),
    ] {
        let entry = limits.for_tier_mut(tier);
        for (slot, window) in [(&mut entry.per_minute, "MINUTE"), (&mut entry.per_day, "DAY")] {
            let var = format!("TONEGATE_LIMIT_{prefix}_{window}");
            let Some(raw) = get(&var) else { continue };
            match raw.parse::<u32>() {
                Ok(value) if value > 0 => *slot = value,
                _ => tracing::warn!(
                    var = %var,
                    value = %raw,
                    default = *slot,
                    "ignoring invalid tier limit override"
                ),
            }
        }
    }
    limits
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|err| ConfigError::Invalid {
            var,
            reason: err.to_string(),
            value,
        }),
    }
}

fn parse_bool(var: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            var,
            value: other.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}
