//! In-memory session runtime.
//!
//! `LocalSession` keeps the message list and agent state of one session and
//! publishes a revision counter on a watch channel whenever a change should
//! be re-rendered. In-place edits of the streaming content do not bump the
//! revision; commits do.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::content::ContentBlock;
use crate::error::RuntimeError;
use crate::runtime::{AgentSnapshot, Message, RefreshFuture, Role, SessionRuntime};

/// Where agent state comes from on refresh.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn get_state(&self, session_id: &str) -> Result<AgentSnapshot, RuntimeError>;
}

/// State source for sessions with no live agent behind them (replays).
/// Always reports an idle agent.
#[derive(Debug, Default, Clone)]
pub struct OfflineStateSource;

#[async_trait]
impl StateSource for OfflineStateSource {
    async fn get_state(&self, _session_id: &str) -> Result<AgentSnapshot, RuntimeError> {
        Ok(AgentSnapshot::default())
    }
}

/// Message store and agent state of one open session.
pub struct LocalSession {
    session_id: String,
    messages: Vec<Message>,
    /// Index into `messages` of the streaming message.
    streaming: Option<usize>,
    loading: bool,
    agent: AgentSnapshot,
    source: Arc<dyn StateSource>,
    revision: watch::Sender<u64>,
    commits: u64,
}

impl LocalSession {
    pub fn new(session_id: impl Into<String>, source: Arc<dyn StateSource>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            streaming: None,
            loading: false,
            agent: AgentSnapshot::default(),
            source,
            revision,
            commits: 0,
        }
    }

    /// Receiver that observes every published change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Number of streaming-content commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    pub fn agent(&self) -> &AgentSnapshot {
        &self.agent
    }

    pub fn transcript(&self) -> SessionTranscript<'_> {
        SessionTranscript {
            session_id: &self.session_id,
            loading: self.loading,
            agent: &self.agent,
            messages: &self.messages,
        }
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn push_message(&mut self, role: Role, content: Vec<ContentBlock>, streaming: bool) -> usize {
        self.messages.push(Message {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            role,
            content,
            timestamp: chrono::Utc::now().timestamp_millis(),
            streaming,
        });
        self.messages.len() - 1
    }
}

impl std::fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSession")
            .field("session_id", &self.session_id)
            .field("messages", &self.messages.len())
            .field("streaming", &self.streaming)
            .field("loading", &self.loading)
            .finish()
    }
}

impl SessionRuntime for LocalSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.notify();
        }
    }

    fn is_loading(&self) -> bool {
        self.loading
    }

    fn add_user_message(&mut self, content: Vec<ContentBlock>) {
        self.push_message(Role::User, content, false);
        self.notify();
    }

    fn create_streaming_message(&mut self) -> String {
        // At most one streaming message per session.
        self.finalize_streaming_message();
        let idx = self.push_message(Role::Assistant, Vec::new(), true);
        self.streaming = Some(idx);
        self.notify();
        self.messages[idx].id.clone()
    }

    fn streaming_message_id(&self) -> Option<&str> {
        self.streaming.map(|idx| self.messages[idx].id.as_str())
    }

    fn streaming_content_mut(&mut self) -> Option<&mut Vec<ContentBlock>> {
        let idx = self.streaming?;
        Some(&mut self.messages[idx].content)
    }

    fn update_streaming_message(&mut self, content: Vec<ContentBlock>) {
        let Some(idx) = self.streaming else {
            return;
        };
        self.messages[idx].content = content;
        self.commits += 1;
        self.notify();
    }

    fn finalize_streaming_message(&mut self) {
        if let Some(idx) = self.streaming.take() {
            self.messages[idx].streaming = false;
            self.notify();
        }
    }

    fn update_tool_call_result(&mut self, call_id: &str, text: &str, is_error: bool) -> bool {
        let call = self
            .messages
            .iter_mut()
            .rev()
            .flat_map(|message| message.content.iter_mut())
            .filter_map(ContentBlock::as_tool_call_mut)
            .find(|call| call.id == call_id);

        match call {
            Some(call) => {
                call.result = Some(text.to_string());
                call.is_error = Some(is_error);
                self.notify();
                true
            }
            None => false,
        }
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn refresh_state(&self) -> RefreshFuture {
        let source = Arc::clone(&self.source);
        let session_id = self.session_id.clone();
        async move { source.get_state(&session_id).await }.boxed()
    }

    fn apply_state(&mut self, snapshot: AgentSnapshot) {
        self.agent = snapshot;
        self.notify();
    }
}

/// Serializable view of a session for dumps.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTranscript<'a> {
    pub session_id: &'a str,
    pub loading: bool,
    pub agent: &'a AgentSnapshot,
    pub messages: &'a [Message],
}
