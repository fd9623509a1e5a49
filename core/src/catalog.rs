//! Mode → (prompt, output schema) contracts.
//!
//! The catalog is built once and never mutated, so lookups need no locking.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

/// Mode identifiers are matched exactly; there are no aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Rewrite,
    Urgent,
    SendCheck,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Rewrite, Mode::Urgent, Mode::SendCheck];
    pub const DEFAULT: Mode = Mode::Rewrite;

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Rewrite => "rewrite",
            Mode::Urgent => "urgent",
            Mode::SendCheck => "send_check",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown mode '{mode}'")]
    UnknownMode {
        mode: String,
        suggestion: Option<&'static str>,
    },
}

#[derive(Debug, Clone)]
pub struct ModeContract {
    pub mode: Mode,
    pub prompt: &'static str,
    pub schema_name: &'static str,
    pub schema: Value,
}

pub struct ModeCatalog {
    contracts: Vec<ModeContract>,
}

static CATALOG: LazyLock<ModeCatalog> = LazyLock::new(ModeCatalog::builtin);

/// Levenshtein distance at or below which an unknown mode gets a suggestion.
const SUGGESTION_MAX_DISTANCE: usize = 3;

impl ModeCatalog {
    /// Process-wide catalog.
    pub fn global() -> &'static ModeCatalog {
        &CATALOG
    }

    fn builtin() -> Self {
        Self {
            contracts: vec![
                ModeContract {
                    mode: Mode::Rewrite,
                    prompt: REWRITE_PROMPT,
                    schema_name: "rewrite_variants",
                    schema: rewrite_schema(),
                },
                ModeContract {
                    mode: Mode::Urgent,
                    prompt: URGENT_PROMPT,
                    schema_name: "urgency_triage",
                    schema: urgent_schema(),
                },
                ModeContract {
                    mode: Mode::SendCheck,
                    prompt: SEND_CHECK_PROMPT,
                    schema_name: "send_check",
                    schema: send_check_schema(),
                },
            ],
        }
    }

    pub fn resolve(&self, mode_id: &str) -> Result<&ModeContract, CatalogError> {
        self.contracts
            .iter()
            .find(|contract| contract.mode.as_str() == mode_id)
            .ok_or_else(|| CatalogError::UnknownMode {
                mode: mode_id.to_string(),
                suggestion: self.suggest(mode_id),
            })
    }

    pub fn modes(&self) -> impl Iterator<Item = Mode> + '_ {
        self.contracts.iter().map(|contract| contract.mode)
    }

    /// Closest known mode identifier, if any is near enough to be a typo.
    pub fn suggest(&self, mode_id: &str) -> Option<&'static str> {
        let lowered = mode_id.trim().to_lowercase().replace('-', "_");
        self.contracts
            .iter()
            .map(|contract| {
                let known = contract.mode.as_str();
                (known, strsim::levenshtein(&lowered, known))
            })
            .filter(|(_, distance)| *distance <= SUGGESTION_MAX_DISTANCE)
            .min_by_key(|(_, distance)| *distance)
            .map(|(known, _)| known)
    }
}

pub const URGENCY_LABELS: [&str; 4] = ["Urgent", "Soon", "Can wait", "No reply needed"];

const REWRITE_PROMPT: &str = "\
You are a communication rewrite assistant.
Rewrite the user's message in 3 variants: Polite, Neutral, Warm.

Rules:
- Keep the same intent and content (do not add new commitments).
- Keep it concise.
- Avoid corporate fluff.";

const URGENT_PROMPT: &str = "\
You are an inbox triage assistant.
Read the message the user received and decide how urgently it needs a reply.

Rules:
- label must be exactly one of: Urgent, Soon, Can wait, No reply needed.
- why: one or two sentences naming the concrete signals (deadlines, requests, consequences).
- suggested_reply: a short reply the user could send now; keep it honest and do not invent facts.";

const SEND_CHECK_PROMPT: &str = "\
You are a pre-send review assistant.
Read the message the user is about to send and judge the risk of sending it as written.

Rules:
- risk_level: Low, Medium, or High.
- flags: at most 4 short phrases naming specific problems (tone, blame, ambiguity, oversharing). Empty list if none.
- recommendation: Send, Rewrite, or Wait 24 hours.
- safer_version: a calmer rewrite that keeps the intent. Must be an empty string when recommendation is Send.";

fn rewrite_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "polite": { "type": "string" },
            "neutral": { "type": "string" },
            "warm": { "type": "string" }
        },
        "required": ["polite", "neutral", "warm"],
        "additionalProperties": false
    })
}

fn urgent_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "label": {
                "type": "string",
                "description": format!("One of: {}", URGENCY_LABELS.join(", "))
            },
            "why": { "type": "string" },
            "suggested_reply": { "type": "string" }
        },
        "required": ["label", "why", "suggested_reply"],
        "additionalProperties": false
    })
}

fn send_check_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "risk_level": { "type": "string", "enum": ["Low", "Medium", "High"] },
            "flags": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": crate::outputs::MAX_SEND_CHECK_FLAGS
            },
            "recommendation": {
                "type": "string",
                "enum": ["Send", "Rewrite", "Wait 24 hours"]
            },
            "safer_version": { "type": "string" }
        },
        "required": ["risk_level", "flags", "recommendation", "safer_version"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_each_enumerated_mode() {
        let catalog = ModeCatalog::global();
        for mode in Mode::ALL {
            let contract = catalog.resolve(mode.as_str()).expect("mode should resolve");
            assert_eq!(contract.mode, mode);
            assert_eq!(contract.schema["additionalProperties"], false);
        }
        assert_eq!(catalog.modes().count(), 3);
    }

    #[test]
    fn lookup_is_case_sensitive_without_aliases() {
        let catalog = ModeCatalog::global();
        assert!(catalog.resolve("Rewrite").is_err());
        assert!(catalog.resolve("send-check").is_err());
        assert!(catalog.resolve("").is_err());
    }

    #[test]
    fn unknown_mode_carries_suggestion_for_typos() {
        let err = ModeCatalog::global()
            .resolve("send-check")
            .expect_err("alias must not resolve");
        assert_eq!(
            err,
            CatalogError::UnknownMode {
                mode: "send-check".to_string(),
                suggestion: Some("send_check"),
            }
        );

        let err = ModeCatalog::global()
            .resolve("bogus")
            .expect_err("bogus must not resolve");
        assert!(matches!(err, CatalogError::UnknownMode { suggestion: None, .. }));
    }

    #[test]
    fn schemas_require_every_declared_property() {
        for mode in Mode::ALL {
            let contract = ModeCatalog::global().resolve(mode.as_str()).unwrap();
            let properties = contract.schema["properties"]
                .as_object()
                .expect("schema should declare properties");
            let required: Vec<&str> = contract.schema["required"]
                .as_array()
                .expect("schema should declare required")
                .iter()
                .filter_map(Value::as_str)
                .collect();
            assert_eq!(properties.len(), required.len(), "{mode}");
            assert!(properties.keys().all(|k| required.contains(&k.as_str())));
        }
    }
}
