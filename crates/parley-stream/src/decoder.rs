//! Line-delimited event decoder.
//!
//! Turns incrementally-arriving response bytes into complete decoded events.
//! Chunks may split lines, and even multi-byte UTF-8 sequences, at arbitrary
//! positions; the decoder buffers raw bytes and only interprets text once a
//! full line is available. A line that fails to decode is logged and dropped,
//! never aborting the stream.

use tracing::warn;

use crate::event::StreamEvent;

/// Incremental decoder for one newline-delimited JSON response stream.
///
/// One decoder instance serves exactly one stream; it is not restartable.
/// Feed arriving chunks to [`push`](LineDecoder::push) and call
/// [`finish`](LineDecoder::finish) once the stream ends.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    dropped: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it, in order.
    ///
    /// The trailing partial line (if any) is retained for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Report the end of the stream.
    ///
    /// A non-empty remaining buffer means the backend closed mid-line; this
    /// is a protocol warning, not a failure. Returns the truncated remainder
    /// so callers can surface it.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            return None;
        }
        warn!(
            remainder_len = rest.len(),
            "Stream ended with an incomplete trailing line"
        );
        Some(text.into_owned())
    }

    /// Number of lines discarded because they failed to decode.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let raw = strip_cr(raw);
        let text = match std::str::from_utf8(raw) {
            Ok(t) => t,
            Err(e) => {
                self.dropped += 1;
                warn!(error = %e, "Discarding stream line with invalid UTF-8");
                return None;
            }
        };
        if text.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<StreamEvent>(text) {
            Ok(event) => Some(event),
            Err(e) => {
                self.dropped += 1;
                warn!(error = %e, line = text, "Discarding malformed stream line");
                None
            }
        }
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

// =============================================================================
// Tests
// =============================================================================
