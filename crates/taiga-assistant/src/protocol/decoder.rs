use serde_json::Value;
use tracing::debug;

use super::{ProtocolError, StreamEvent};

/// Splits an arbitrarily chunked byte stream into complete lines.
///
/// Bytes after the last newline stay buffered until the next chunk completes them,
/// so a payload split across reads is never parsed early.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and take every line it completes, without the line terminator
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        // '\n' never occurs inside a multi-byte sequence, so every complete line is whole UTF-8
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Take whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).trim_end().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// The `data:` payload of a server-sent event line, if it has one
pub fn data_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    (!payload.trim().is_empty()).then_some(payload)
}

/// Parse one complete line of the chat stream.
///
/// Blank lines, comments and non-data fields carry no event. A complete data line
/// that is not valid JSON is a protocol error.
pub fn parse_line(line: &str) -> Result<Option<StreamEvent>, ProtocolError> {
    let Some(payload) = data_payload(line) else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(payload).map_err(|source| ProtocolError::Malformed {
        line: line.to_string(),
        source,
    })?;
    let event = StreamEvent::from_json(&value);
    if event.is_none() {
        debug!(payload, "ignoring stream payload without an event");
    }
    Ok(event)
}

/// Turns raw response chunks into chat stream events
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineDecoder,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, ProtocolError> {
        let mut events = Vec::new();
        for line in self.lines.push(chunk) {
            if let Some(event) = parse_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Parse the trailing fragment once the transport has closed
    pub fn finish(&mut self) -> Result<Option<StreamEvent>, ProtocolError> {
        match self.lines.finish() {
            Some(line) => parse_line(&line),
            None => Ok(None),
        }
    }
}
