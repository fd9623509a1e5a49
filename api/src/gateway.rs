//! Request pipeline for `POST /v1/run`: validate, resolve the mode, admit
//! against quota, dispatch, extract, parse.
//!
//! Quota is consumed only after validation and mode resolution succeed, and
//! before any outbound call. A request that is admitted keeps its quota
//! charge whatever happens afterwards, including client disconnects.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tonegate_core::catalog::{CatalogError, ModeCatalog};
use tonegate_core::extract::extract_output_text;
use tonegate_core::gateway::{GatewayError, MAX_OUTPUT_UNITS, parse_output, validated_input};
use tonegate_core::identity::{Identity, QuotaWindow, TierLimits};
use tonegate_core::quota::{Admission, Decision, QuotaLedger, WindowRequest};

use crate::generation::{GenerationClient, GenerationError, GenerationRequest};

/// Per-window decisions for an admitted request, used for response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub minute: Decision,
    pub day: Decision,
}

impl QuotaStatus {
    pub fn windows(&self) -> [(QuotaWindow, Decision); 2] {
        [
            (QuotaWindow::Minute, self.minute),
            (QuotaWindow::Day, self.day),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySuccess {
    /// The model's JSON object, returned to the caller verbatim.
    pub result: Value,
    pub quota: QuotaStatus,
}

pub struct Gateway {
    catalog: &'static ModeCatalog,
    ledger: Arc<QuotaLedger>,
    limits: TierLimits,
    generator: Arc<dyn GenerationClient>,
}

impl Gateway {
    pub fn new(
        ledger: Arc<QuotaLedger>,
        limits: TierLimits,
        generator: Arc<dyn GenerationClient>,
    ) -> Self {
        Self {
            catalog: ModeCatalog::global(),
            ledger,
            limits,
            generator,
        }
    }

    pub fn catalog(&self) -> &'static ModeCatalog {
        self.catalog
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    #[tracing::instrument(
        name = "gateway",
        skip_all,
        fields(
            mode = %mode_id,
            tier = identity.tier().as_str(),
            request_id = %crate::middleware::request_id::current(),
        )
    )]
    pub async fn handle(
        &self,
        raw_input: &str,
        mode_id: &str,
        identity: &Identity,
    ) -> Result<GatewaySuccess, GatewayError> {
        let outcome = self.run(raw_input, mode_id, identity).await;
        match &outcome {
            Ok(success) => tracing::info!(
                minute_remaining = success.quota.minute.remaining(),
                day_remaining = success.quota.day.remaining(),
                "generation succeeded"
            ),
            Err(err) => tracing::warn!(code = err.code(), error = %err, "run failed"),
        }
        outcome
    }

    async fn run(
        &self,
        raw_input: &str,
        mode_id: &str,
        identity: &Identity,
    ) -> Result<GatewaySuccess, GatewayError> {
        let input = validated_input(raw_input)?;

        let contract = self.catalog.resolve(mode_id).map_err(
            |CatalogError::UnknownMode { mode, suggestion }| GatewayError::InvalidMode {
                mode,
                suggestion,
            },
        )?;

        let quota = self.admit(identity)?;

        if !self.generator.has_credential() {
            return Err(GatewayError::MissingCredential);
        }

        let request = GenerationRequest {
            system_prompt: contract.prompt.to_string(),
            user_content: input,
            max_output_units: MAX_OUTPUT_UNITS,
            schema_name: contract.schema_name.to_string(),
            schema: contract.schema.clone(),
        };

        let payload = self
            .generator
            .generate(&request)
            .await
            .map_err(|err| match err {
                GenerationError::Decode(message) => GatewayError::Unknown { message },
                other => GatewayError::UpstreamError {
                    diagnostic: other.to_string(),
                },
            })?;

        let text = extract_output_text(&payload).ok_or(GatewayError::EmptyOutput)?;
        let result = parse_output(contract.mode, text)?;
        Ok(GatewaySuccess { result, quota })
    }

    /// Consume one unit in every window, or none if any window denies.
    fn admit(&self, identity: &Identity) -> Result<QuotaStatus, GatewayError> {
        let limits = self.limits.for_identity(identity);
        let keys = QuotaWindow::ALL.map(|window| identity.quota_key(window));
        let requests: Vec<WindowRequest<'_>> = keys
            .iter()
            .map(|key| WindowRequest {
                key,
                limit: limits.for_window(key.window),
                window: key.window.duration(),
            })
            .collect();

        match self.ledger.consume_all(&requests) {
            Admission::Allowed(decisions) => {
                let [minute, day] = <[Decision; 2]>::try_from(decisions).map_err(|_| {
                    GatewayError::Unknown {
                        message: "quota admission returned an unexpected window count".to_string(),
                    }
                })?;
                Ok(QuotaStatus { minute, day })
            }
            Admission::Denied { index, decision } => {
                let window = keys[index].window;
                Err(GatewayError::RateLimited {
                    window,
                    retry_after_ms: decision.reset_in_ms(),
                    limit: decision.limit(),
                })
            }
        }
    }
}

/// Periodically drop expired quota buckets so idle identities do not
/// accumulate. Runs until the process exits.
pub fn spawn_quota_sweeper(
    ledger: Arc<QuotaLedger>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = ledger.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, remaining = ledger.len(), "swept expired quota buckets");
            }
        }
    })
}
