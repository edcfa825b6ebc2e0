//! Error types.

use thiserror::Error;

/// Result type for transport ingestion.
pub type IngestResult<T> = Result<T, IngestError>;

/// Why a transport line was not turned into a session event.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Line is not valid JSON.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope lacks a required field.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Envelope exceeds the configured size limit.
    #[error("payload too large: {len} chars exceeds limit of {limit}")]
    Oversized { len: usize, limit: usize },

    /// A well-formed envelope whose event has an unrecognised shape.
    #[error("unsupported event for session {session_id}: {reason}")]
    UnsupportedEvent { session_id: String, reason: String },

    /// A JSON line that is not a session event (e.g. plain agent output).
    #[error("not a session event: {0}")]
    NotSessionEvent(String),
}

impl IngestError {
    /// Transport-level failures are worth a warning; the rest is expected noise.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Json(_) | Self::MissingField(_) | Self::Oversized { .. }
        )
    }
}

/// Failures of the session runtime's asynchronous collaborators.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The agent state source cannot be reached.
    #[error("state source unavailable: {0}")]
    Unavailable(String),

    /// The agent answered with an error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// The stream service task is gone.
#[derive(Debug, Error)]
#[error("stream service has stopped")]
pub struct ServiceStopped;
