//! Incremental parsing of `data: <json>` server-sent-event lines.

use memchr::memchr;
use tracing::warn;

use crate::api::ChatResponse;
use crate::core::error::ChatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Text appended by this record; may be empty.
    Delta(String),
    Done,
    /// Comments, keep-alives and non-data fields.
    Ignored,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Parses one complete line. A malformed JSON record is a recoverable
/// [`ChatError::Parse`]; callers log it and keep reading.
pub fn parse_line(line: &str) -> Result<SseEvent, ChatError> {
    let line = line.trim();
    let Some(payload) = extract_data_payload(line) else {
        return Ok(SseEvent::Ignored);
    };

    if payload == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    if payload.trim().is_empty() {
        return Ok(SseEvent::Ignored);
    }

    let response: ChatResponse = serde_json::from_str(payload)
        .map_err(|e| ChatError::Parse(format!("{e} - data: {payload}")))?;
    let delta = response
        .choices
        .first()
        .and_then(|choice| choice.delta.content.clone())
        .unwrap_or_default();
    Ok(SseEvent::Delta(delta))
}

/// Accumulates raw transport bytes and yields complete lines.
#[derive(Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete line, decoded lossily so a stray byte cannot stall the stream.
    pub fn next_line(&mut self) -> Option<String> {
        let newline_pos = memchr(b'\n', &self.buffer)?;
        let line = String::from_utf8_lossy(&self.buffer[..newline_pos])
            .trim_end_matches('\r')
            .to_string();
        self.buffer.drain(..=newline_pos);
        Some(line)
    }

    /// Whatever is left once the transport closes without a trailing newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).to_string();
        self.buffer.clear();
        Some(rest)
    }
}

/// Folds parsed records into the cumulative response text.
#[derive(Default)]
pub struct StreamAccumulator {
    text: String,
    skipped: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line; returns true once the `[DONE]` sentinel is seen.
    /// Non-empty deltas trigger `on_update` with the full text so far.
    pub fn feed_line(&mut self, line: &str, on_update: &mut dyn FnMut(&str)) -> bool {
        match parse_line(line) {
            Ok(SseEvent::Done) => true,
            Ok(SseEvent::Delta(delta)) => {
                if !delta.is_empty() {
                    self.text.push_str(&delta);
                    on_update(&self.text);
                }
                false
            }
            Ok(SseEvent::Ignored) => false,
            Err(err) => {
                self.skipped += 1;
                warn!("skipping stream record: {err}");
                false
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
