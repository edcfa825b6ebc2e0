//! Message payloads carried by `message_start` / `message_update` / `message_end`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Agent message (user, assistant, or tool result).
///
/// `content` is left as raw JSON: the agent sends either a plain string or an
/// array of typed blocks, and conversion is the consumer's business.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Tool call id for tool-result messages.
    #[serde(rename = "toolCallId", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name for tool-result messages.
    #[serde(rename = "toolName", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Whether the tool result is an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Set by the agent when generation failed.
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Preserve unknown fields for forward-compatibility.
    #[serde(flatten, default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl AgentMessage {
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    pub fn role(&self) -> MessageRole {
        MessageRole::parse(&self.role)
    }
}

/// Roles the reconciler distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    ToolResult,
    /// Anything else (system prompts, custom extension roles, missing role).
    Other,
}

impl MessageRole {
    pub fn parse(role: &str) -> Self {
        match role {
            "user" | "human" => Self::User,
            "assistant" | "agent" => Self::Assistant,
            "toolResult" | "tool" => Self::ToolResult,
            _ => Self::Other,
        }
    }
}

/// A complete tool call as delivered by `toolcall_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}
