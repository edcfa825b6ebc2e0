//! Agent events and the session envelope they travel in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::{AgentMessage, ToolCall};

// ============================================================================
// Envelope
// ============================================================================

/// One event addressed to one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEventEnvelope {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub event: AgentEvent,
}

impl SessionEventEnvelope {
    pub fn new(session_id: impl Into<String>, event: AgentEvent) -> Self {
        Self {
            session_id: session_id.into(),
            event,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Events streamed by the agent for a single session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Agent begins processing a prompt.
    AgentStart,
    /// Agent finished processing.
    AgentEnd {
        #[serde(default)]
        messages: Vec<Value>,
    },
    /// New turn begins.
    TurnStart,
    /// Turn completes.
    TurnEnd,
    /// A message (user, assistant or tool result) begins.
    MessageStart { message: AgentMessage },
    /// Streaming update of the assistant message.
    MessageUpdate {
        #[serde(default)]
        message: Option<AgentMessage>,
        #[serde(rename = "assistantMessageEvent")]
        assistant_message_event: AssistantMessageEvent,
    },
    /// A message completes. For assistant messages `content` is authoritative.
    MessageEnd { message: AgentMessage },
    /// Tool begins execution.
    ToolExecutionStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName", default)]
        tool_name: Option<String>,
        #[serde(default)]
        args: Value,
    },
    /// Tool execution progress.
    ToolExecutionUpdate {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName", default)]
        tool_name: Option<String>,
        #[serde(rename = "partialResult", default)]
        partial_result: Value,
    },
    /// Tool completes. `result` is heterogeneous (string, block list, object).
    ToolExecutionEnd {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName", default)]
        tool_name: Option<String>,
        #[serde(default)]
        result: Value,
        #[serde(rename = "isError", default)]
        is_error: bool,
    },
    /// Auto-compaction begins.
    AutoCompactionStart {
        #[serde(default)]
        reason: Option<String>,
    },
    /// Auto-compaction completes.
    AutoCompactionEnd {
        #[serde(default)]
        aborted: bool,
        #[serde(rename = "willRetry", default)]
        will_retry: bool,
    },
    /// Auto-retry begins.
    AutoRetryStart {
        #[serde(default)]
        attempt: u32,
        #[serde(rename = "maxAttempts", default)]
        max_attempts: u32,
        #[serde(rename = "errorMessage", default)]
        error_message: Option<String>,
    },
    /// Auto-retry completes.
    AutoRetryEnd {
        #[serde(default)]
        success: bool,
        #[serde(default)]
        attempt: u32,
        #[serde(rename = "finalError", default)]
        final_error: Option<String>,
    },
    /// Unknown event type (forward-compatible).
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    /// The wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentStart => "agent_start",
            Self::AgentEnd { .. } => "agent_end",
            Self::TurnStart => "turn_start",
            Self::TurnEnd => "turn_end",
            Self::MessageStart { .. } => "message_start",
            Self::MessageUpdate { .. } => "message_update",
            Self::MessageEnd { .. } => "message_end",
            Self::ToolExecutionStart { .. } => "tool_execution_start",
            Self::ToolExecutionUpdate { .. } => "tool_execution_update",
            Self::ToolExecutionEnd { .. } => "tool_execution_end",
            Self::AutoCompactionStart { .. } => "auto_compaction_start",
            Self::AutoCompactionEnd { .. } => "auto_compaction_end",
            Self::AutoRetryStart { .. } => "auto_retry_start",
            Self::AutoRetryEnd { .. } => "auto_retry_end",
            Self::Unknown => "unknown",
        }
    }

    /// True for the high-frequency text/thinking fragments.
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            Self::MessageUpdate {
                assistant_message_event: AssistantMessageEvent::TextDelta { .. }
                    | AssistantMessageEvent::ThinkingDelta { .. },
                ..
            }
        )
    }
}

/// Sub-events of a streaming assistant message.
///
/// The `partial` message snapshot the agent attaches to each of these is not
/// modelled: the content is reconstructed from the fragments instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantMessageEvent {
    Start,
    TextStart {
        #[serde(rename = "contentIndex")]
        content_index: usize,
    },
    TextDelta {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        delta: String,
    },
    TextEnd {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        #[serde(default)]
        content: String,
    },
    ThinkingStart {
        #[serde(rename = "contentIndex")]
        content_index: usize,
    },
    ThinkingDelta {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        delta: String,
    },
    ThinkingEnd {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        /// The agent sends this as "content"; older builds used "thinking".
        #[serde(alias = "thinking", default)]
        content: String,
    },
    ToolcallStart {
        #[serde(rename = "contentIndex")]
        content_index: usize,
    },
    ToolcallDelta {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        #[serde(default)]
        delta: String,
    },
    ToolcallEnd {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },
    Done {
        #[serde(default)]
        reason: Option<String>,
    },
    Error {
        #[serde(default)]
        reason: Option<String>,
    },
    /// Unknown assistant event type (forward-compatible).
    #[serde(other)]
    Unknown,
}

impl AssistantMessageEvent {
    /// The content block this event addresses, if any.
    pub fn content_index(&self) -> Option<usize> {
        match self {
            Self::TextStart { content_index }
            | Self::TextDelta { content_index, .. }
            | Self::TextEnd { content_index, .. }
            | Self::ThinkingStart { content_index }
            | Self::ThinkingDelta { content_index, .. }
            | Self::ThinkingEnd { content_index, .. }
            | Self::ToolcallStart { content_index }
            | Self::ToolcallDelta { content_index, .. }
            | Self::ToolcallEnd { content_index, .. } => Some(*content_index),
            Self::Start | Self::Done { .. } | Self::Error { .. } | Self::Unknown => None,
        }
    }
}
