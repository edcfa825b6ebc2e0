//! Per-session delta batching.
//!
//! Fragments are applied to the streaming content as they arrive so a direct
//! read is always current. The pending list only decides when the message
//! store is due a commit: at most one frame callback is outstanding per
//! session, and each callback (or forced flush) commits exactly once. A
//! cancel rolls the content back to what was last committed.

use std::collections::HashMap;

use log::trace;

use crate::content::{BlockKind, ContentBlock, append_to_block};
use crate::frame::{FrameHandle, FrameQueue};
use crate::runtime::SessionRuntime;

/// A fragment applied since the last commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelta {
    pub content_index: usize,
    pub delta: String,
    pub kind: BlockKind,
}

/// Committed state of the blocks a batch has touched.
#[derive(Debug)]
struct Undo {
    len: usize,
    blocks: Vec<(usize, ContentBlock)>,
}

impl Undo {
    fn record(&mut self, content: &[ContentBlock], index: usize) {
        if index < self.len && !self.blocks.iter().any(|(i, _)| *i == index) {
            self.blocks.push((index, content[index].clone()));
        }
    }

    fn restore(self, content: &mut Vec<ContentBlock>) {
        for (index, block) in self.blocks {
            if let Some(slot) = content.get_mut(index) {
                *slot = block;
            }
        }
        content.truncate(self.len);
    }
}

#[derive(Debug, Default)]
struct Batcher {
    pending: Vec<PendingDelta>,
    scheduled: Option<FrameHandle>,
    undo: Option<Undo>,
}

/// Batchers of every open session plus the shared frame queue.
#[derive(Debug, Default)]
pub struct DeltaBatcher {
    batchers: HashMap<String, Batcher>,
    frames: FrameQueue,
}

impl DeltaBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `fragment` to the streaming content of `runtime` and record it.
    ///
    /// The content is fetched from the runtime on every call. Returns false
    /// when the runtime has no streaming message.
    pub fn enqueue<R: SessionRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        content_index: usize,
        fragment: &str,
        kind: BlockKind,
    ) -> bool {
        let session_id = runtime.session_id().to_string();
        let Some(content) = runtime.streaming_content_mut() else {
            return false;
        };
        let batcher = self.batchers.entry(session_id).or_default();
        batcher
            .undo
            .get_or_insert_with(|| Undo {
                len: content.len(),
                blocks: Vec::new(),
            })
            .record(content, content_index);
        append_to_block(content, content_index, fragment, kind);

        batcher.pending.push(PendingDelta {
            content_index,
            delta: fragment.to_string(),
            kind,
        });
        true
    }

    /// Request a commit on the next frame. No-op if one is already requested.
    pub fn schedule_flush(&mut self, session_id: &str) {
        let batcher = self.batchers.entry(session_id.to_string()).or_default();
        if batcher.scheduled.is_none() {
            batcher.scheduled = Some(self.frames.request(session_id));
        }
    }

    /// Commit now. Cancels any requested frame so it cannot commit again.
    /// Returns whether a commit happened.
    pub fn flush<R: SessionRuntime + ?Sized>(&mut self, runtime: &mut R) -> bool {
        let Some(batcher) = self.batchers.get_mut(runtime.session_id()) else {
            return false;
        };
        if let Some(handle) = batcher.scheduled.take() {
            self.frames.cancel(handle);
        }
        batcher.undo = None;
        if batcher.pending.is_empty() {
            return false;
        }
        let applied = std::mem::take(&mut batcher.pending);
        trace!(
            "Committing {} deltas for session {}",
            applied.len(),
            runtime.session_id()
        );
        runtime.commit_streaming()
    }

    /// Cancel any requested frame and drop pending deltas without committing.
    /// Fragments already applied are taken back out of the streaming content.
    pub fn cancel<R: SessionRuntime + ?Sized>(&mut self, runtime: &mut R) {
        let Some(batcher) = self.batchers.get_mut(runtime.session_id()) else {
            return;
        };
        if let Some(handle) = batcher.scheduled.take() {
            self.frames.cancel(handle);
        }
        if !batcher.pending.is_empty() {
            trace!(
                "Discarding {} deltas for session {}",
                batcher.pending.len(),
                runtime.session_id()
            );
        }
        batcher.pending.clear();
        let undo = batcher.undo.take();
        if let Some(undo) = undo
            && let Some(content) = runtime.streaming_content_mut()
        {
            undo.restore(content);
        }
    }

    /// Tear down a session's batcher entirely.
    pub fn remove(&mut self, session_id: &str) {
        if let Some(batcher) = self.batchers.remove(session_id)
            && let Some(handle) = batcher.scheduled
        {
            self.frames.cancel(handle);
        }
    }

    /// Frame callbacks due on this tick.
    pub fn take_due_frames(&mut self) -> Vec<(FrameHandle, String)> {
        self.frames.drain()
    }

    /// Run a due frame callback. A handle that is no longer the session's
    /// scheduled one is stale and does nothing.
    pub fn fire<R: SessionRuntime + ?Sized>(&mut self, handle: FrameHandle, runtime: &mut R) -> bool {
        match self.batchers.get_mut(runtime.session_id()) {
            Some(batcher) if batcher.scheduled == Some(handle) => {
                batcher.scheduled = None;
                self.flush(runtime)
            }
            _ => false,
        }
    }

    pub fn pending_len(&self, session_id: &str) -> usize {
        self.batchers
            .get(session_id)
            .map_or(0, |batcher| batcher.pending.len())
    }

    pub fn is_scheduled(&self, session_id: &str) -> bool {
        self.batchers
            .get(session_id)
            .is_some_and(|batcher| batcher.scheduled.is_some())
    }

    pub fn has_scheduled_frames(&self) -> bool {
        !self.frames.is_empty()
    }
}
