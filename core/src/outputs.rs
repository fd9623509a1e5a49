//! Typed result shapes for each mode, and the local conformance check run on
//! everything the generation service returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::catalog::Mode;

pub const MAX_SEND_CHECK_FLAGS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RewriteOutput {
    pub polite: String,
    pub neutral: String,
    pub warm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UrgentOutput {
    /// Urgency category, e.g. "Urgent" or "Can wait"
    pub label: String,
    pub why: String,
    pub suggested_reply: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Recommendation {
    Send,
    Rewrite,
    #[serde(rename = "Wait 24 hours")]
    Wait24Hours,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SendCheckOutput {
    pub risk_level: RiskLevel,
    /// At most four short phrases
    pub flags: Vec<String>,
    pub recommendation: Recommendation,
    /// Empty when `recommendation` is `Send`
    pub safer_version: String,
}

/// Closed union over the three mode contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ModeOutput {
    Rewrite(RewriteOutput),
    Urgent(UrgentOutput),
    SendCheck(SendCheckOutput),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OutputValidationError {
    #[error("output does not match the {mode} contract: {detail}")]
    Shape { mode: Mode, detail: String },
    #[error("flags has {count} entries; at most 4 are allowed")]
    TooManyFlags { count: usize },
    #[error("safer_version must be empty when recommendation is Send")]
    SaferVersionWithSend,
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
}

impl ModeOutput {
    /// Decode a parsed JSON object into the mode's typed shape and check the
    /// rules the JSON schema alone cannot express.
    pub fn decode(mode: Mode, value: &Value) -> Result<Self, OutputValidationError> {
        let output = match mode {
            Mode::Rewrite => ModeOutput::Rewrite(decode_shape(mode, value)?),
            Mode::Urgent => ModeOutput::Urgent(decode_shape(mode, value)?),
            Mode::SendCheck => ModeOutput::SendCheck(decode_shape(mode, value)?),
        };
        output.check()?;
        Ok(output)
    }

    fn check(&self) -> Result<(), OutputValidationError> {
        match self {
            ModeOutput::Rewrite(_) => Ok(()),
            ModeOutput::Urgent(output) => {
                if output.label.trim().is_empty() {
                    return Err(OutputValidationError::BlankField { field: "label" });
                }
                Ok(())
            }
            ModeOutput::SendCheck(output) => {
                if output.flags.len() > MAX_SEND_CHECK_FLAGS {
                    return Err(OutputValidationError::TooManyFlags {
                        count: output.flags.len(),
                    });
                }
                if output.recommendation == Recommendation::Send
                    && !output.safer_version.trim().is_empty()
                {
                    return Err(OutputValidationError::SaferVersionWithSend);
                }
                Ok(())
            }
        }
    }
}

fn decode_shape<T: serde::de::DeserializeOwned>(
    mode: Mode,
    value: &Value,
) -> Result<T, OutputValidationError> {
    T::deserialize(value).map_err(|err| OutputValidationError::Shape {
        mode,
        detail: err.to_string(),
    })
}
