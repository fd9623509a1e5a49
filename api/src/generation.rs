//! Outbound client for the text-generation service.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

use crate::config::GenerationConfig;

/// Longest upstream error body carried into a diagnostic.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// One structured-output generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_content: String,
    pub max_output_units: u32,
    pub schema_name: String,
    pub schema: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The service answered with a non-success status.
    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },
    /// The call never produced a response (connect failure, timeout).
    #[error("generation service unreachable: {0}")]
    Transport(String),
    /// A success status whose body is not JSON.
    #[error("generation service response was not JSON: {0}")]
    Decode(String),
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Whether a service credential is configured. Checked before dispatch.
    fn has_credential(&self) -> bool;

    /// Issue one generation call and return the raw response payload.
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError>;
}

/// Client for a Responses-style endpoint (`POST {base}/v1/responses`).
pub struct OpenAiResponsesClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl OpenAiResponsesClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint: responses_endpoint(&config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationClient for OpenAiResponsesClient {
    fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request_body(&self.model, request))
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                schema = %request.schema_name,
                "generation service returned non-success status"
            );
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_DIAGNOSTIC_CHARS),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| GenerationError::Decode(err.to_string()))
    }
}

/// `{base}/v1/responses`, keeping any path prefix on the base URL.
fn responses_endpoint(base: &Url) -> Url {
    let mut endpoint = base.clone();
    let prefix = base.path().trim_end_matches('/').to_string();
    endpoint.set_path(&format!("{prefix}/v1/responses"));
    endpoint
}

fn request_body(model: &str, request: &GenerationRequest) -> Value {
    json!({
        "model": model,
        "input": [
            { "role": "system", "content": request.system_prompt },
            { "role": "user", "content": request.user_content }
        ],
        "max_output_tokens": request.max_output_units,
        "text": {
            "format": {
                "type": "json_schema",
                "name": request.schema_name,
                "strict": true,
                "schema": request.schema
            }
        }
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
