//! Coalescing frame callbacks.
//!
//! A stand-in for a display refresh hook: work registers a callback for the
//! next frame, the host fires every registered callback once per tick. A
//! cancelled callback is removed from the queue and can never fire.

use std::collections::BTreeMap;

/// Identifies one registered frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameHandle(u64);

/// Callbacks waiting for the next frame, in registration order.
#[derive(Debug, Default)]
pub struct FrameQueue {
    next_handle: u64,
    pending: BTreeMap<FrameHandle, String>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `session_id` on the next frame.
    pub fn request(&mut self, session_id: &str) -> FrameHandle {
        self.next_handle += 1;
        let handle = FrameHandle(self.next_handle);
        self.pending.insert(handle, session_id.to_string());
        handle
    }

    /// Cancel a registered callback. Returns false if it already fired.
    pub fn cancel(&mut self, handle: FrameHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    /// Take every callback due on this frame.
    pub fn drain(&mut self) -> Vec<(FrameHandle, String)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
