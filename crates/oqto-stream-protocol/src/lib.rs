//! Wire types for the per-session agent event stream.
//!
//! The agent process multiplexes every open conversation onto a single
//! newline-delimited JSON stream. Each line carries one event for one session:
//!
//! ```text
//! {"type":"session_event","sessionId":"s1","event":{"type":"message_update",...}}
//! ```
//!
//! This crate only describes the shapes on that stream. Reconciling the events
//! into a displayable transcript lives in `oqto-stream`.
//!
//! All enums are forward-compatible: unknown event kinds deserialize to an
//! `Unknown` variant instead of failing the whole line.

pub mod events;
pub mod messages;

pub use events::{AgentEvent, AssistantMessageEvent, SessionEventEnvelope};
pub use messages::{AgentMessage, MessageRole, ToolCall};
