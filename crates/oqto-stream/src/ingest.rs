//! Transport ingestion: byte chunks to session event envelopes.
//!
//! Agent processes write newline-delimited JSON. Lines may arrive split
//! across reads and may carry terminal escape sequences or stray bytes around
//! the JSON object.

use oqto_stream_protocol::{AgentEvent, SessionEventEnvelope};
use serde_json::Value;

use crate::compact::compact_event;
use crate::config::StreamConfig;
use crate::error::{IngestError, IngestResult};

/// Splits a byte stream into lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(decode_utf8_lossy(line));
        }
        lines
    }

    /// Remaining partial line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = decode_utf8_lossy(std::mem::take(&mut self.buffer));
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn decode_utf8_lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Strip whitespace, BOM and NUL padding. If the result does not look like a
/// bare JSON object, remove escape sequences and keep the outermost `{...}`.
pub fn sanitize_line(line: &str) -> String {
    let trimmed = trim_noise(line);
    if is_clean_json_object(trimmed) {
        return trimmed.to_string();
    }

    let stripped = strip_ansi_escapes(line);
    let value = trim_noise(&stripped);
    match extract_json_object_candidate(value) {
        Some(candidate) => candidate.to_string(),
        None => value.to_string(),
    }
}

fn trim_noise(value: &str) -> &str {
    value
        .trim()
        .trim_start_matches('\u{feff}')
        .trim_matches('\0')
}

fn is_clean_json_object(value: &str) -> bool {
    value.starts_with('{') && value.ends_with('}') && !value.contains('\u{1b}')
}

/// Remove CSI, OSC and string-terminated escape sequences.
pub fn strip_ansi_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\u{1b}' {
            out.push(ch);
            continue;
        }

        match chars.next() {
            // CSI: ESC [ params final-byte
            Some('[') => {
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: ESC ] ... BEL | ESC \
            Some(']') => {
                while let Some(c) = chars.next() {
                    if c == '\u{07}' {
                        break;
                    }
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            // DCS, SOS, PM, APC: ESC x ... ESC \
            Some('P' | 'X' | '^' | '_') => {
                while let Some(c) = chars.next() {
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            Some(_) | None => {}
        }
    }

    out
}

/// Slice from the first `{` to the last `}`.
pub fn extract_json_object_candidate(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&input[start..=end])
}

/// Log-friendly prefix of `value`.
pub fn shorten_for_log(value: &str, max_chars: usize) -> String {
    crate::compact::truncate_chars(value, max_chars)
}

/// Parse one transport line.
///
/// Blank lines and RPC responses yield `Ok(None)`. Both the tagged
/// `{"type":"session_event",...}` envelope and the bare
/// `{"sessionId":...,"event":...}` shape are accepted. Events are compacted
/// before the `max_event_chars` guard runs.
pub fn parse_line(line: &str, config: &StreamConfig) -> IngestResult<Option<SessionEventEnvelope>> {
    let line = sanitize_line(line);
    if line.is_empty() {
        return Ok(None);
    }

    let mut json: Value = serde_json::from_str(&line)?;
    let Some(map) = json.as_object_mut() else {
        return Err(IngestError::NotSessionEvent("not a JSON object".to_string()));
    };

    match map.get("type").and_then(Value::as_str) {
        None | Some("session_event") => {}
        Some("response") => return Ok(None),
        Some(other) => return Err(IngestError::NotSessionEvent(other.to_string())),
    }

    let session_id = match map.get("sessionId").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(IngestError::MissingField("sessionId")),
    };
    let mut event = map
        .remove("event")
        .filter(Value::is_object)
        .ok_or(IngestError::MissingField("event"))?;

    compact_event(&mut event, config.max_tool_result_chars);

    // The guard applies to what survives compaction; raw lines carry the
    // whole message snapshot in `partial`.
    let len = serde_json::to_string(&event)?.chars().count();
    if len > config.max_event_chars {
        return Err(IngestError::Oversized {
            len,
            limit: config.max_event_chars,
        });
    }

    let event: AgentEvent =
        serde_json::from_value(event).map_err(|err| IngestError::UnsupportedEvent {
            session_id: session_id.clone(),
            reason: err.to_string(),
        })?;

    Ok(Some(SessionEventEnvelope::new(session_id, event)))
}
