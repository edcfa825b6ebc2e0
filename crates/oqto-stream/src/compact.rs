//! Size limiting of raw events before dispatch.
//!
//! Tool arguments and structured tool results can be arbitrarily large. They
//! are cut down to a shallow preview; string results keep their text up to a
//! configurable length.

use serde_json::{Map, Value, json};

const MAX_DEPTH: usize = 2;
const MAX_STRING_CHARS: usize = 1024;
const MAX_OBJECT_KEYS: usize = 16;
const MAX_ARRAY_ITEMS: usize = 16;

pub const TRUNCATED_ARRAY_ITEMS: &str = "_truncatedArrayItems";
pub const TRUNCATED_OBJECT_KEYS: &str = "_truncatedObjectKeys";

/// Cut `value` to `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &value[..byte_idx]),
        None => value.to_string(),
    }
}

/// Shallow preview of an arbitrary JSON value.
///
/// Containers below the depth limit are replaced by a marker object carrying
/// their element count; wide containers keep their first entries plus a
/// marker with the number dropped.
pub fn compact_value(value: &Value) -> Value {
    compact_at(value, 0)
}

fn compact_at(value: &Value, depth: usize) -> Value {
    match value {
        Value::String(text) => Value::String(truncate_chars(text, MAX_STRING_CHARS)),
        Value::Array(items) => {
            if depth >= MAX_DEPTH {
                return json!({ TRUNCATED_ARRAY_ITEMS: items.len() });
            }
            let mut compacted: Vec<Value> = items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(|item| compact_at(item, depth + 1))
                .collect();
            if items.len() > MAX_ARRAY_ITEMS {
                compacted.push(json!({ TRUNCATED_ARRAY_ITEMS: items.len() - MAX_ARRAY_ITEMS }));
            }
            Value::Array(compacted)
        }
        Value::Object(map) => {
            if depth >= MAX_DEPTH {
                return json!({ TRUNCATED_OBJECT_KEYS: map.len() });
            }
            let mut compacted: Map<String, Value> = map
                .iter()
                .take(MAX_OBJECT_KEYS)
                .map(|(key, entry)| (key.clone(), compact_at(entry, depth + 1)))
                .collect();
            if map.len() > MAX_OBJECT_KEYS {
                compacted.insert(
                    TRUNCATED_OBJECT_KEYS.to_string(),
                    json!(map.len() - MAX_OBJECT_KEYS),
                );
            }
            Value::Object(compacted)
        }
        _ => value.clone(),
    }
}

/// Compact a raw agent event in place.
pub fn compact_event(event: &mut Value, max_tool_result_chars: usize) {
    let Some(map) = event.as_object_mut() else {
        return;
    };

    match map.get("type").and_then(Value::as_str) {
        Some("message_update") => {
            if let Some(Value::Object(inner)) = map.get_mut("assistantMessageEvent") {
                // Content is rebuilt from deltas; the snapshot is redundant.
                inner.remove("partial");
                if let Some(Value::Object(call)) = inner.get_mut("toolCall")
                    && let Some(arguments) = call.get_mut("arguments")
                {
                    *arguments = compact_value(arguments);
                }
            }
        }
        Some("tool_execution_start") => {
            if let Some(args) = map.get_mut("args") {
                *args = compact_value(args);
            }
        }
        Some("tool_execution_update") => {
            map.remove("partialResult");
        }
        Some("tool_execution_end") => {
            if let Some(result) = map.get_mut("result") {
                let compacted = match &*result {
                    Value::String(text) => Value::String(truncate_chars(text, max_tool_result_chars)),
                    other => compact_value(other),
                };
                *result = compacted;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("héllo", 5), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé…");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_depth_limit() {
        let value = json!({"a": {"b": {"c": 1}, "list": [1, 2]}});
        assert_eq!(
            compact_value(&value),
            json!({"a": {"b": {"_truncatedObjectKeys": 1}, "list": {"_truncatedArrayItems": 2}}})
        );
    }

    #[test]
    fn test_width_limits() {
        let items: Vec<Value> = (0..20).map(|i| json!(i)).collect();
        let compacted = compact_value(&Value::Array(items));
        let compacted = compacted.as_array().unwrap();
        assert_eq!(compacted.len(), 17);
        assert_eq!(compacted[16], json!({"_truncatedArrayItems": 4}));

        let map: Map<String, Value> = (0..18).map(|i| (format!("k{i:02}"), json!(i))).collect();
        let compacted = compact_value(&Value::Object(map));
        let compacted = compacted.as_object().unwrap();
        assert_eq!(compacted.len(), 17);
        assert_eq!(compacted[TRUNCATED_OBJECT_KEYS], json!(2));
    }

    #[test]
    fn test_message_update_drops_partial() {
        let mut event = json!({
            "type": "message_update",
            "assistantMessageEvent": {
                "type": "toolcall_end",
                "contentIndex": 0,
                "toolCall": {"id": "c1", "name": "read", "arguments": {"deep": {"er": {"x": 1}}}},
                "partial": {"content": []}
            }
        });
        compact_event(&mut event, 100);
        let inner = &event["assistantMessageEvent"];
        assert!(inner.get("partial").is_none());
        assert_eq!(
            inner["toolCall"]["arguments"],
            json!({"deep": {"er": {"_truncatedObjectKeys": 1}}})
        );
    }

    #[test]
    fn test_tool_result_string_truncated() {
        let mut event = json!({
            "type": "tool_execution_end",
            "toolCallId": "c1",
            "result": "abcdef"
        });
        compact_event(&mut event, 3);
        assert_eq!(event["result"], json!("abc…"));
    }

    #[test]
    fn test_other_events_untouched() {
        let mut event = json!({"type": "message_end", "message": {"role": "assistant", "content": "x"}});
        let before = event.clone();
        compact_event(&mut event, 3);
        assert_eq!(event, before);
    }
}
