//! Content model: the block array of a message.
//!
//! Blocks are addressed by a dense index. Referencing an index past the end
//! pads the array with empty text blocks; the array never shrinks through
//! these helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use oqto_stream_protocol::ToolCall;

/// One tagged unit of a message's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    ToolCall(ToolCallBlock),
}

/// A tool call plus the result attached once the tool has executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallBlock {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallBlock> {
        match self {
            Self::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_tool_call_mut(&mut self) -> Option<&mut ToolCallBlock> {
        match self {
            Self::ToolCall(call) => Some(call),
            _ => None,
        }
    }
}

impl From<ToolCall> for ContentBlock {
    fn from(call: ToolCall) -> Self {
        Self::ToolCall(ToolCallBlock {
            id: call.id,
            name: call.name,
            arguments: call.arguments,
            result: None,
            is_error: None,
        })
    }
}

/// Block kinds that receive incremental fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Thinking,
}

impl BlockKind {
    /// A fresh block of this kind holding `fragment`.
    pub fn seed(self, fragment: &str) -> ContentBlock {
        match self {
            Self::Text => ContentBlock::text(fragment),
            Self::Thinking => ContentBlock::thinking(fragment),
        }
    }
}

/// Pad `content` with empty text blocks until `index` exists.
pub fn ensure_index(content: &mut Vec<ContentBlock>, index: usize) {
    if content.len() <= index {
        content.resize_with(index + 1, || ContentBlock::text(""));
    }
}

/// Replace the block at `index` wholesale.
pub fn set_block(content: &mut Vec<ContentBlock>, index: usize, block: ContentBlock) {
    ensure_index(content, index);
    content[index] = block;
}

/// Append `fragment` to the block at `index`.
///
/// A block of the same kind is extended in place. Any other block (or a gap)
/// is replaced by a fresh block of `kind` seeded with `fragment`; kinds are
/// never merged.
pub fn append_to_block(
    content: &mut Vec<ContentBlock>,
    index: usize,
    fragment: &str,
    kind: BlockKind,
) {
    ensure_index(content, index);
    match (&mut content[index], kind) {
        (ContentBlock::Text { text }, BlockKind::Text) => text.push_str(fragment),
        (ContentBlock::Thinking { thinking }, BlockKind::Thinking) => thinking.push_str(fragment),
        (slot, kind) => *slot = kind.seed(fragment),
    }
}

/// Convert raw message content (a string or an array of typed blocks) into
/// blocks. Unsupported block types (images, unknown) are skipped.
pub fn blocks_from_value(content: &Value) -> Vec<ContentBlock> {
    match content {
        Value::String(text) if !text.is_empty() => vec![ContentBlock::text(text.as_str())],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value::<ContentBlock>(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Copy attached tool results from `previous` onto tool-call blocks in `next`
/// that share a call id and carry no result of their own.
pub fn carry_tool_results(previous: &[ContentBlock], next: &mut [ContentBlock]) {
    for call in next.iter_mut().filter_map(ContentBlock::as_tool_call_mut) {
        if call.result.is_some() {
            continue;
        }
        if let Some(old) = previous
            .iter()
            .filter_map(ContentBlock::as_tool_call)
            .find(|old| old.id == call.id && old.result.is_some())
        {
            call.result = old.result.clone();
            call.is_error = old.is_error;
        }
    }
}
