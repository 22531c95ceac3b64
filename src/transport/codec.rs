//! NDJSON record codec with multi-line reassembly.
//!
//! The tool usually emits one JSON record per line, but records may be
//! split across reads and — rarely — across lines. The codec frames the
//! byte stream into lines (via [`LinesCodec`] with a hard length limit),
//! then accumulates trimmed non-empty line content in a reassembly
//! buffer until the buffer parses as one JSON value. A successful parse
//! emits the value and clears the buffer.
//!
//! Embedded newlines inside JSON strings are escaped as `\n` on the wire
//! and therefore never cause premature framing.
//!
//! # Overflow
//!
//! If the reassembly buffer (or a single unterminated line) exceeds the
//! configured maximum before a successful decode, the buffer is cleared
//! and the codec yields [`AgentError::Decode`] naming the limit.

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::errors::{AgentError, Result};

/// Default maximum reassembly buffer: 1 MiB.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1_048_576;

/// NDJSON record decoder for the tool's stdout.
#[derive(Debug)]
pub struct RecordCodec {
    lines: LinesCodec,
    partial: String,
    max_buffer: usize,
}

impl RecordCodec {
    /// Create a codec with the default 1 MiB buffer bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER_BYTES)
    }

    /// Create a codec with an explicit buffer bound in bytes.
    #[must_use]
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_buffer),
            partial: String::new(),
            max_buffer,
        }
    }

    /// Append one framed line to the reassembly buffer and attempt a
    /// decode. `Ok(None)` means "keep accumulating".
    fn accumulate(&mut self, line: &str) -> Result<Option<Value>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        self.partial.push_str(trimmed);

        match serde_json::from_str::<Value>(&self.partial) {
            Ok(value) => {
                self.partial.clear();
                Ok(Some(value))
            }
            Err(parse_err) => {
                if self.partial.len() > self.max_buffer {
                    let err = AgentError::decode(
                        &self.partial,
                        format!(
                            "reassembly buffer exceeded {} bytes ({} accumulated): {parse_err}",
                            self.max_buffer,
                            self.partial.len()
                        ),
                    );
                    self.partial.clear();
                    return Err(err);
                }
                // Partial JSON — wait for the rest of the record.
                Ok(None)
            }
        }
    }

    fn map_line_error(&mut self, err: LinesCodecError) -> AgentError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                let err = AgentError::decode(
                    &self.partial,
                    format!("line exceeded maximum buffer of {} bytes", self.max_buffer),
                );
                self.partial.clear();
                err
            }
            LinesCodecError::Io(io_err) => AgentError::Connection(io_err.to_string()),
        }
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RecordCodec {
    type Item = Value;
    type Error = AgentError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        loop {
            match self.lines.decode(src) {
                Ok(Some(line)) => {
                    if let Some(value) = self.accumulate(&line)? {
                        return Ok(Some(value));
                    }
                }
                Ok(None) => return Ok(None),
                Err(err) => return Err(self.map_line_error(err)),
            }
        }
    }

    /// Drain any final unterminated line at EOF. A complete trailing
    /// value is emitted; an incomplete one is discarded.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) => {
                    if let Some(value) = self.accumulate(&line)? {
                        return Ok(Some(value));
                    }
                }
                Ok(None) => {
                    self.partial.clear();
                    return Ok(None);
                }
                Err(err) => return Err(self.map_line_error(err)),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
