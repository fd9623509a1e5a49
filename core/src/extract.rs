use serde_json::Value;

const OUTPUT_TEXT_BLOCK: &str = "output_text";

/// Locate the generated text in a Responses-style payload.
///
/// Checks the structured `output[*].content[*]` blocks first (first block
/// tagged `output_text` wins) and falls back to the top-level `output_text`
/// convenience field. Returns `None` when neither holds a non-empty string.
pub fn extract_output_text(payload: &Value) -> Option<&str> {
    structured_text(payload)
        .or_else(|| payload.get(OUTPUT_TEXT_BLOCK).and_then(Value::as_str))
        .filter(|text| !text.is_empty())
}

fn structured_text(payload: &Value) -> Option<&str> {
    payload
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .find(|block| block.get("type").and_then(Value::as_str) == Some(OUTPUT_TEXT_BLOCK))
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
}
