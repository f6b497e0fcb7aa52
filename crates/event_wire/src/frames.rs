use serde_json::Value;

use crate::error::WireError;
use crate::events::{decode_value, WireMessage};

/// Decodes one frame line.
///
/// Blank lines, SSE comments and `[DONE]` markers decode to `Ok(None)`. An
/// optional SSE `data:` prefix is stripped first.
pub fn decode_line(line: &[u8]) -> Result<Option<WireMessage>, WireError> {
    let text = std::str::from_utf8(line).map_err(WireError::Utf8)?;
    let text = text.trim();
    if text.is_empty() || text.starts_with(':') {
        return Ok(None);
    }

    let payload = text.strip_prefix("data:").map_or(text, str::trim);
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(payload).map_err(WireError::json)?;
    decode_value(&value).map(Some)
}

/// Incremental parser for newline-delimited frames.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    skipped: usize,
}

impl FrameParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds arbitrary bytes and drains every complete frame.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<WireMessage> {
        self.buffer.extend_from_slice(bytes);
        let mut messages = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=split).collect();
            self.decode_into(&line[..split], &mut messages);
        }

        messages
    }

    /// Decodes a trailing frame that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<WireMessage> {
        let line = std::mem::take(&mut self.buffer);
        let mut messages = Vec::new();
        self.decode_into(&line, &mut messages);
        messages
    }

    /// Parses a complete payload in one shot.
    pub fn parse_frames(input: &str) -> Vec<WireMessage> {
        let mut parser = Self::default();
        let mut messages = parser.feed(input.as_bytes());
        messages.extend(parser.finish());
        messages
    }

    /// Number of frames dropped because they failed to decode.
    #[must_use]
    pub fn skipped_frames(&self) -> usize {
        self.skipped
    }

    #[must_use]
    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    fn decode_into(&mut self, line: &[u8], messages: &mut Vec<WireMessage>) {
        match decode_line(line) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(error) => {
                self.skipped += 1;
                tracing::debug!(%error, "skipping undecodable frame");
            }
        }
    }
}
