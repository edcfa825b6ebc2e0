//! Multi-session streaming event reconciliation.
//!
//! Agent processes emit a stream of session events (deltas, block
//! boundaries, message and turn ends, tool results). This crate folds that
//! stream into per-session message stores, coalescing high-frequency deltas
//! to at most one commit per frame.
//!
//! ```text
//! transport line -> ingest::parse_line -> Reconciler::handle
//!     delta      -> DeltaBatcher (applied now, committed on next frame)
//!     structural -> flush pending, then content::set_block + commit
//! ```

pub mod batcher;
pub mod compact;
pub mod config;
pub mod content;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pending_results;
pub mod reconciler;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod store;
pub mod tool_result;

pub use config::{AppConfig, StreamConfig};
pub use content::{BlockKind, ContentBlock, ToolCallBlock};
pub use error::{IngestError, RuntimeError, ServiceStopped};
pub use reconciler::Reconciler;
pub use runtime::{AgentSnapshot, Message, Role, SessionRuntime};
pub use service::{Inbound, StreamHandle, StreamService};
pub use store::{LocalSession, OfflineStateSource, StateSource};
pub use tool_result::format_tool_result;
