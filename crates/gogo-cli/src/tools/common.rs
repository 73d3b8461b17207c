use gogo_ai::ToolResult;
use serde_json::{Map, Value};

/// Tool arguments as a map; `null` counts as no arguments.
pub(super) fn argument_map(arguments: &Value) -> Result<Map<String, Value>, ToolResult> {
    match arguments {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(ToolResult::failure(format!(
            "invalid input: expected a JSON object, got {}",
            value_kind(other)
        ))),
    }
}

/// Output bodies are passed back as JSON when they parse, otherwise as text.
pub(super) fn output_value(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
