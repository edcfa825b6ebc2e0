//! Event reconciler.
//!
//! Applies agent events to session runtimes. Text and thinking deltas go
//! through the [`DeltaBatcher`]; every other event first commits whatever
//! deltas are pending so structural edits never overtake earlier fragments.
//! The one exception is an assistant `message_end`, whose content is
//! authoritative: pending deltas are discarded instead, and the message falls
//! back to its last committed content when the event carries none.
//!
//! Nothing here suspends. Agent state refreshes are queued as futures for the
//! caller to drive; their outcome comes back through
//! [`Reconciler::apply_refresh`].

use log::{debug, info, trace, warn};
use oqto_stream_protocol::{
    AgentEvent, AgentMessage, AssistantMessageEvent, MessageRole, SessionEventEnvelope,
};

use crate::batcher::DeltaBatcher;
use crate::config::StreamConfig;
use crate::content::{BlockKind, ContentBlock, blocks_from_value, carry_tool_results, set_block};
use crate::error::RuntimeError;
use crate::pending_results::PendingResults;
use crate::registry::{RuntimeFactory, SessionRegistry};
use crate::runtime::{AgentSnapshot, RefreshFuture, SessionRuntime};
use crate::tool_result::format_tool_result;

/// A state refresh started by a terminal event.
pub struct PendingRefresh {
    pub session_id: String,
    pub future: RefreshFuture,
}

impl std::fmt::Debug for PendingRefresh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRefresh")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

pub struct Reconciler<R> {
    config: StreamConfig,
    registry: SessionRegistry<R>,
    batcher: DeltaBatcher,
    results: PendingResults,
    refreshes: Vec<PendingRefresh>,
}

impl<R: SessionRuntime> Reconciler<R> {
    pub fn new(config: StreamConfig, factory: RuntimeFactory<R>) -> Self {
        Self {
            registry: SessionRegistry::new(factory, config.closed_session_memory),
            batcher: DeltaBatcher::new(),
            results: PendingResults::new(config.max_orphan_results),
            refreshes: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn handle_envelope(&mut self, envelope: SessionEventEnvelope) {
        self.handle(&envelope.session_id, envelope.event);
    }

    /// Apply one event. Events for sessions that are not open are dropped, as
    /// are block events addressing an index past `max_content_index`.
    pub fn handle(&mut self, session_id: &str, event: AgentEvent) {
        if matches!(event, AgentEvent::AgentStart) {
            if let Some(runtime) = self.registry.ensure(session_id) {
                runtime.set_loading(true);
            }
            return;
        }

        if let AgentEvent::MessageUpdate {
            assistant_message_event,
            ..
        } = &event
            && let Some(index) = assistant_message_event.content_index()
            && index > self.config.max_content_index
        {
            debug!(
                "Dropping message_update for session {} with content index {} beyond {}",
                session_id, index, self.config.max_content_index
            );
            return;
        }

        let Self {
            registry,
            batcher,
            results,
            refreshes,
            ..
        } = self;
        let Some(runtime) = registry.get_mut(session_id) else {
            debug!(
                "Dropping {} for unknown session {}",
                event.kind(),
                session_id
            );
            return;
        };

        Dispatch {
            session_id,
            runtime,
            batcher,
            results,
            refreshes,
        }
        .apply(event);
    }

    /// Open a session explicitly, clearing any earlier close.
    pub fn open_session(&mut self, session_id: &str) -> &mut R {
        info!("Opening session {}", session_id);
        self.registry.register(session_id)
    }

    /// Open a session with a prebuilt runtime.
    pub fn insert_session(&mut self, session_id: &str, runtime: R) {
        info!("Opening session {}", session_id);
        self.registry.insert(session_id, runtime);
    }

    /// Tear a session down in one step: its scheduled frame, pending deltas,
    /// parked results and queued refreshes are dropped, and later events for
    /// it are ignored.
    pub fn close_session(&mut self, session_id: &str) -> Option<R> {
        self.batcher.remove(session_id);
        self.results.remove(session_id);
        self.refreshes
            .retain(|refresh| refresh.session_id != session_id);
        let runtime = self.registry.remove(session_id);
        if runtime.is_some() {
            info!("Closed session {}", session_id);
        }
        runtime
    }

    /// Run the frame callbacks that are due. Returns the number of commits.
    pub fn on_frame(&mut self) -> usize {
        let mut commits = 0;
        for (handle, session_id) in self.batcher.take_due_frames() {
            if let Some(runtime) = self.registry.get_mut(&session_id)
                && self.batcher.fire(handle, runtime)
            {
                commits += 1;
            }
        }
        if commits > 0 {
            trace!("Frame committed {} sessions", commits);
        }
        commits
    }

    /// Commit pending deltas of every session.
    pub fn flush_all(&mut self) {
        for (_, runtime) in self.registry.iter_mut() {
            self.batcher.flush(runtime);
        }
    }

    pub fn has_scheduled_frames(&self) -> bool {
        self.batcher.has_scheduled_frames()
    }

    pub fn pending_deltas(&self, session_id: &str) -> usize {
        self.batcher.pending_len(session_id)
    }

    /// Refreshes queued since the last call.
    pub fn take_refreshes(&mut self) -> Vec<PendingRefresh> {
        std::mem::take(&mut self.refreshes)
    }

    /// Deliver the outcome of a refresh. Failures are logged and otherwise
    /// ignored; a session closed in the meantime is left alone.
    pub fn apply_refresh(&mut self, session_id: &str, outcome: Result<AgentSnapshot, RuntimeError>) {
        match (self.registry.get_mut(session_id), outcome) {
            (Some(runtime), Ok(snapshot)) => runtime.apply_state(snapshot),
            (Some(_), Err(err)) => {
                warn!("State refresh failed for session {}: {}", session_id, err);
            }
            (None, _) => debug!("Discarding refresh for closed session {}", session_id),
        }
    }

    pub fn session(&self, session_id: &str) -> Option<&R> {
        self.registry.get(session_id)
    }

    pub fn session_mut(&mut self, session_id: &str) -> Option<&mut R> {
        self.registry.get_mut(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.registry.ids()
    }

    pub fn is_closed(&self, session_id: &str) -> bool {
        self.registry.is_closed(session_id)
    }

    pub fn parked_results(&self, session_id: &str) -> usize {
        self.results.len(session_id)
    }
}

/// Everything one event may touch, borrowed for the duration of its handling.
struct Dispatch<'a, R: ?Sized> {
    session_id: &'a str,
    runtime: &'a mut R,
    batcher: &'a mut DeltaBatcher,
    results: &'a mut PendingResults,
    refreshes: &'a mut Vec<PendingRefresh>,
}

impl<R: SessionRuntime + ?Sized> Dispatch<'_, R> {
    fn apply(mut self, event: AgentEvent) {
        match &event {
            AgentEvent::MessageEnd { message } if message.role() == MessageRole::Assistant => {
                self.batcher.cancel(self.runtime);
            }
            event if !event.is_delta() => {
                self.batcher.flush(self.runtime);
            }
            _ => {}
        }

        match event {
            AgentEvent::AgentEnd { .. } => self.on_agent_end(),
            AgentEvent::TurnEnd => self.runtime.finalize_streaming_message(),
            AgentEvent::MessageStart { message } => self.on_message_start(message),
            AgentEvent::MessageUpdate {
                message,
                assistant_message_event,
            } => self.on_message_update(message.as_ref(), assistant_message_event),
            AgentEvent::MessageEnd { message } => self.on_message_end(message),
            AgentEvent::ToolExecutionEnd {
                tool_call_id,
                result,
                is_error,
                ..
            } => {
                let text = format_tool_result(Some(&result));
                self.attach_result(&tool_call_id, text, is_error);
            }
            AgentEvent::AutoCompactionEnd { .. } => self.refresh(),
            AgentEvent::AgentStart
            | AgentEvent::TurnStart
            | AgentEvent::ToolExecutionStart { .. }
            | AgentEvent::ToolExecutionUpdate { .. }
            | AgentEvent::AutoCompactionStart { .. }
            | AgentEvent::AutoRetryStart { .. }
            | AgentEvent::AutoRetryEnd { .. }
            | AgentEvent::Unknown => {}
        }
    }

    fn on_agent_end(&mut self) {
        self.batcher.remove(self.session_id);
        self.runtime.set_loading(false);
        self.runtime.finalize_streaming_message();
        self.refresh();
    }

    fn on_message_start(&mut self, message: AgentMessage) {
        match message.role() {
            MessageRole::User => {
                self.runtime
                    .add_user_message(blocks_from_value(&message.content));
            }
            MessageRole::ToolResult => {
                let Some(call_id) = message.tool_call_id.as_deref() else {
                    return;
                };
                let text = format_tool_result(Some(&message.content));
                self.attach_result(call_id, text, message.is_error.unwrap_or(false));
            }
            MessageRole::Assistant | MessageRole::Other => {}
        }
    }

    fn on_message_update(&mut self, message: Option<&AgentMessage>, event: AssistantMessageEvent) {
        let role = message.map_or(MessageRole::Assistant, AgentMessage::role);
        if role != MessageRole::Assistant {
            debug!(
                "Ignoring message_update with role {:?} for session {}",
                role, self.session_id
            );
            return;
        }

        if self.runtime.streaming_message_id().is_none() {
            self.runtime.create_streaming_message();
        }

        match event {
            AssistantMessageEvent::TextDelta {
                content_index,
                delta,
            } => self.enqueue(content_index, &delta, BlockKind::Text),
            AssistantMessageEvent::ThinkingDelta {
                content_index,
                delta,
            } => self.enqueue(content_index, &delta, BlockKind::Thinking),
            AssistantMessageEvent::TextStart { content_index } => {
                self.set_block(content_index, ContentBlock::text(""));
            }
            AssistantMessageEvent::TextEnd {
                content_index,
                content,
            } => self.set_block(content_index, ContentBlock::text(content)),
            AssistantMessageEvent::ThinkingStart { content_index } => {
                self.set_block(content_index, ContentBlock::thinking(""));
            }
            AssistantMessageEvent::ThinkingEnd {
                content_index,
                content,
            } => self.set_block(content_index, ContentBlock::thinking(content)),
            AssistantMessageEvent::ToolcallEnd {
                content_index,
                tool_call,
            } => self.set_block(content_index, ContentBlock::from(tool_call)),
            AssistantMessageEvent::Start
            | AssistantMessageEvent::ToolcallStart { .. }
            | AssistantMessageEvent::ToolcallDelta { .. }
            | AssistantMessageEvent::Done { .. }
            | AssistantMessageEvent::Error { .. }
            | AssistantMessageEvent::Unknown => {}
        }
    }

    fn on_message_end(&mut self, message: AgentMessage) {
        if message.role() == MessageRole::Assistant {
            let mut blocks = blocks_from_value(&message.content);
            if blocks.is_empty()
                && let Some(error) = error_text(&message)
            {
                blocks.push(ContentBlock::text(format!("Error: {error}")));
            }

            if !blocks.is_empty() {
                if self.runtime.streaming_message_id().is_none() {
                    self.runtime.create_streaming_message();
                }
                if let Some(previous) = self.runtime.streaming_content_mut() {
                    carry_tool_results(previous, &mut blocks);
                }
                self.results.attach_to(self.session_id, &mut blocks);
                self.runtime.update_streaming_message(blocks);
            }
            self.refresh();
        }

        self.runtime.finalize_streaming_message();
    }

    fn enqueue(&mut self, content_index: usize, fragment: &str, kind: BlockKind) {
        if self
            .batcher
            .enqueue(self.runtime, content_index, fragment, kind)
        {
            self.batcher.schedule_flush(self.session_id);
        }
    }

    fn set_block(&mut self, content_index: usize, block: ContentBlock) {
        let Some(content) = self.runtime.streaming_content_mut() else {
            return;
        };
        let is_tool_call = block.as_tool_call().is_some();
        set_block(content, content_index, block);
        if is_tool_call {
            self.results.attach_to(self.session_id, content);
        }
        self.runtime.commit_streaming();
    }

    /// Attach to an existing tool-call block, or park until one appears.
    fn attach_result(&mut self, call_id: &str, text: String, is_error: bool) {
        if !self.runtime.update_tool_call_result(call_id, &text, is_error) {
            debug!(
                "Parking result for tool call {} in session {}",
                call_id, self.session_id
            );
            self.results.park(self.session_id, call_id, text, is_error);
        }
    }

    fn refresh(&mut self) {
        self.refreshes.push(PendingRefresh {
            session_id: self.session_id.to_string(),
            future: self.runtime.refresh_state(),
        });
    }
}

fn error_text(message: &AgentMessage) -> Option<&str> {
    match message.error_message.as_deref() {
        Some(error) if !error.trim().is_empty() => Some(error),
        _ if message.stop_reason.as_deref() == Some("error") => Some("unknown error"),
        _ => None,
    }
}
