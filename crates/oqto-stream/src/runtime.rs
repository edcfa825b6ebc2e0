//! The per-session runtime the reconciler mutates.
//!
//! A runtime bundles the message store and agent state of one open session.
//! The reconciler never owns message objects itself; it edits them through
//! this contract while a message is the session's streaming message.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::content::ContentBlock;
use crate::error::RuntimeError;

/// Result of an asynchronous agent state refresh.
pub type RefreshFuture = BoxFuture<'static, Result<AgentSnapshot, RuntimeError>>;

/// A displayed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Agent-side state fetched after terminal events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub thinking_level: Option<String>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub message_count: u64,
}

/// Mutation contract of one session's message and agent stores.
pub trait SessionRuntime {
    fn session_id(&self) -> &str;

    fn set_loading(&mut self, loading: bool);

    fn is_loading(&self) -> bool;

    /// Append an already-finalized user message.
    fn add_user_message(&mut self, content: Vec<ContentBlock>);

    /// Open a new streaming assistant message and return its id.
    fn create_streaming_message(&mut self) -> String;

    fn streaming_message_id(&self) -> Option<&str>;

    /// Live content of the streaming message.
    ///
    /// Edits through this reference are visible to readers immediately but
    /// do not notify subscribers; call [`SessionRuntime::update_streaming_message`]
    /// (or [`SessionRuntime::commit_streaming`]) to publish them.
    fn streaming_content_mut(&mut self) -> Option<&mut Vec<ContentBlock>>;

    /// Replace the streaming message content and notify subscribers.
    fn update_streaming_message(&mut self, content: Vec<ContentBlock>);

    /// Clear the streaming flag and pointer. Idempotent.
    fn finalize_streaming_message(&mut self);

    /// Attach a result to the tool-call block with `call_id` in any message.
    /// Returns false if no such block exists yet.
    fn update_tool_call_result(&mut self, call_id: &str, text: &str, is_error: bool) -> bool;

    fn messages(&self) -> &[Message];

    /// Start an agent state refresh. The future must not borrow the runtime.
    fn refresh_state(&self) -> RefreshFuture;

    /// Apply the outcome of a successful refresh.
    fn apply_state(&mut self, snapshot: AgentSnapshot);

    /// Publish in-place edits of the streaming content.
    ///
    /// The content is moved out of the message and handed straight back, so
    /// no copy is made. Returns false when no message is streaming.
    fn commit_streaming(&mut self) -> bool {
        let Some(slot) = self.streaming_content_mut() else {
            return false;
        };
        let content = std::mem::take(slot);
        self.update_streaming_message(content);
        true
    }
}
