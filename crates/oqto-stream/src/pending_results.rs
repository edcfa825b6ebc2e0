//! Tool results that arrived before their tool-call block.

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::content::{ContentBlock, ToolCallBlock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkedResult {
    pub call_id: String,
    pub text: String,
    pub is_error: bool,
}

/// Unattached tool results per session, oldest first.
#[derive(Debug)]
pub struct PendingResults {
    sessions: HashMap<String, VecDeque<ParkedResult>>,
    capacity: usize,
}

impl PendingResults {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            capacity,
        }
    }

    /// Park a result. A newer result for the same call replaces the older
    /// one; past capacity the oldest result is dropped.
    pub fn park(&mut self, session_id: &str, call_id: &str, text: String, is_error: bool) {
        if self.capacity == 0 {
            return;
        }
        let queue = self.sessions.entry(session_id.to_string()).or_default();
        queue.retain(|parked| parked.call_id != call_id);
        queue.push_back(ParkedResult {
            call_id: call_id.to_string(),
            text,
            is_error,
        });
        while queue.len() > self.capacity {
            if let Some(dropped) = queue.pop_front() {
                debug!(
                    "Dropping unattached tool result {} for session {}",
                    dropped.call_id, session_id
                );
            }
        }
    }

    pub fn take(&mut self, session_id: &str, call_id: &str) -> Option<ParkedResult> {
        let queue = self.sessions.get_mut(session_id)?;
        let pos = queue.iter().position(|parked| parked.call_id == call_id)?;
        let parked = queue.remove(pos);
        if queue.is_empty() {
            self.sessions.remove(session_id);
        }
        parked
    }

    /// Attach parked results to matching tool-call blocks in `content`.
    /// Returns the number attached.
    pub fn attach_to(&mut self, session_id: &str, content: &mut [ContentBlock]) -> usize {
        let mut attached = 0;
        for call in content.iter_mut().filter_map(ContentBlock::as_tool_call_mut) {
            if let Some(parked) = self.take(session_id, &call.id) {
                apply(call, parked);
                attached += 1;
            }
        }
        attached
    }

    pub fn remove(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn len(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map_or(0, VecDeque::len)
    }
}

fn apply(call: &mut ToolCallBlock, parked: ParkedResult) {
    call.result = Some(parked.text);
    call.is_error = Some(parked.is_error);
}
