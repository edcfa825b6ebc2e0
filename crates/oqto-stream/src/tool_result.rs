//! Display text for heterogeneous tool-execution results.

use serde::Serialize;
use serde_json::Value;

/// Returned when a result cannot be rendered as JSON.
pub const UNSERIALIZABLE_RESULT: &str = "[unserializable tool result]";

/// Turn a tool result into display text. Never fails.
///
/// - missing or `null` -> empty string
/// - string -> itself
/// - array -> strings and `{type: "text", text}` blocks joined by newlines
/// - object with a `content` array -> same extraction on `content`
/// - anything else (or nothing extractable) -> pretty-printed JSON
pub fn format_tool_result(result: Option<&Value>) -> String {
    let Some(result) = result else {
        return String::new();
    };

    match result {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) => result.to_string(),
        Value::Array(items) => extract_text(items).unwrap_or_else(|| pretty_json(result)),
        Value::Object(map) => map
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| extract_text(items))
            .unwrap_or_else(|| pretty_json(result)),
    }
}

/// Pretty JSON for any serializable value, or [`UNSERIALIZABLE_RESULT`].
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| UNSERIALIZABLE_RESULT.to_string())
}

fn extract_text(items: &[Value]) -> Option<String> {
    let parts: Vec<&str> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.as_str()),
            Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                obj.get("text").and_then(Value::as_str)
            }
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}
