//! Shared fixtures for reconciler and service tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use oqto_stream::content::ContentBlock;
use oqto_stream::store::{LocalSession, OfflineStateSource, StateSource};
use oqto_stream::{AgentSnapshot, Reconciler, RuntimeError, SessionRuntime, StreamConfig};
use oqto_stream_protocol::AgentEvent;
use serde_json::{Value, json};

/// State source that always fails and counts how often it was asked.
#[derive(Debug, Default)]
pub struct FailingStateSource {
    pub calls: AtomicUsize,
}

#[async_trait]
impl StateSource for FailingStateSource {
    async fn get_state(&self, session_id: &str) -> Result<AgentSnapshot, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RuntimeError::Backend(format!("agent for {session_id} crashed")))
    }
}

/// State source reporting a fixed model.
#[derive(Debug)]
pub struct FixedStateSource(pub &'static str);

#[async_trait]
impl StateSource for FixedStateSource {
    async fn get_state(&self, _session_id: &str) -> Result<AgentSnapshot, RuntimeError> {
        Ok(AgentSnapshot {
            model: Some(self.0.to_string()),
            message_count: 1,
            ..AgentSnapshot::default()
        })
    }
}

pub fn local_reconciler() -> Reconciler<LocalSession> {
    reconciler_with(Arc::new(OfflineStateSource))
}

pub fn reconciler_with(source: Arc<dyn StateSource>) -> Reconciler<LocalSession> {
    Reconciler::new(
        StreamConfig::default(),
        Box::new(move |id: &str| LocalSession::new(id, Arc::clone(&source))),
    )
}

/// Parse an event from its wire JSON.
pub fn event(value: Value) -> AgentEvent {
    serde_json::from_value(value).expect("valid agent event")
}

pub fn text_start(index: usize) -> AgentEvent {
    assistant_update(json!({"type": "text_start", "contentIndex": index}))
}

pub fn text_delta(index: usize, delta: &str) -> AgentEvent {
    assistant_update(json!({"type": "text_delta", "contentIndex": index, "delta": delta}))
}

pub fn thinking_delta(index: usize, delta: &str) -> AgentEvent {
    assistant_update(json!({"type": "thinking_delta", "contentIndex": index, "delta": delta}))
}

pub fn text_end(index: usize, content: &str) -> AgentEvent {
    assistant_update(json!({"type": "text_end", "contentIndex": index, "content": content}))
}

pub fn toolcall_end(index: usize, id: &str, name: &str) -> AgentEvent {
    assistant_update(json!({
        "type": "toolcall_end",
        "contentIndex": index,
        "toolCall": {"type": "toolCall", "id": id, "name": name, "arguments": {"path": "src/lib.rs"}}
    }))
}

pub fn assistant_update(inner: Value) -> AgentEvent {
    event(json!({
        "type": "message_update",
        "message": {"role": "assistant"},
        "assistantMessageEvent": inner
    }))
}

pub fn assistant_end(content: Value) -> AgentEvent {
    event(json!({"type": "message_end", "message": {"role": "assistant", "content": content}}))
}

pub fn tool_execution_end(id: &str, result: Value, is_error: bool) -> AgentEvent {
    event(json!({
        "type": "tool_execution_end",
        "toolCallId": id,
        "toolName": "read",
        "result": result,
        "isError": is_error
    }))
}

pub fn agent_start() -> AgentEvent {
    event(json!({"type": "agent_start"}))
}

pub fn agent_end() -> AgentEvent {
    event(json!({"type": "agent_end", "messages": []}))
}

/// Wire line for `event` in session `session_id`.
pub fn line(session_id: &str, event: Value) -> String {
    json!({"type": "session_event", "sessionId": session_id, "event": event}).to_string()
}

pub fn last_content(reconciler: &Reconciler<LocalSession>, session_id: &str) -> Vec<ContentBlock> {
    reconciler
        .session(session_id)
        .and_then(|session| session.messages().last())
        .map(|message| message.content.clone())
        .unwrap_or_default()
}
