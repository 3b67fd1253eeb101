//! Incremental SSE framing over an arbitrarily-chunked byte stream
//!
//! The transport hands us byte buffers whose boundaries carry no
//! meaning: a frame terminator, a field prefix, or a single multi-byte
//! character can all straddle two reads. [`FrameReader`] buffers across
//! pushes so the emitted frame sequence is identical for every possible
//! partitioning of the same bytes.

/// One protocol frame: an event label plus its payload text.
///
/// Constructed the moment a blank-line terminator is observed and
/// consumed immediately by the decoder; never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Event label, `"message"` unless the frame carried an `event:` line
    pub event: String,
    /// Payload text from the frame's `data:` line
    pub data: String,
}

/// Turns raw transport reads into complete [`StreamFrame`]s.
#[derive(Debug, Default)]
pub struct FrameReader {
    /// Undecoded tail bytes: at most one incomplete UTF-8 sequence,
    /// completed by the next push
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a blank line
    buffer: String,
}

impl FrameReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport read, returning every frame it completed.
    ///
    /// Frames are returned in arrival order. A fragment without a
    /// `data:` line carries nothing actionable and is dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.decode(bytes);

        let mut frames = Vec::new();
        while let Some((end, skip)) = find_terminator(&self.buffer) {
            let rest = self.buffer.split_off(end + skip);
            self.buffer.truncate(end);
            let fragment = std::mem::replace(&mut self.buffer, rest);
            if let Some(frame) = parse_fragment(&fragment) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Append new bytes to the pending tail and move every complete
    /// UTF-8 sequence into the text buffer.
    fn decode(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        self.buffer.push_str(text);
                    }
                    match err.error_len() {
                        // Truncated sequence at the tail: keep it for the next push
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        // Genuinely invalid bytes: replace and keep decoding
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }
}

/// Locate the first blank-line terminator, returning its byte offset
/// and length. Accepts both LF and CRLF framing.
fn find_terminator(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n");
    let crlf = buffer.find("\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) if b < a => Some((b, 4)),
        (Some(a), _) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

/// Scan a complete fragment's lines for `event:` and `data:` fields.
fn parse_fragment(fragment: &str) -> Option<StreamFrame> {
    let mut event = None;
    let mut data = None;

    for line in fragment.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data = Some(rest.trim().to_string());
        }
    }

    data.map(|data| StreamFrame {
        event: event.unwrap_or_else(|| "message".to_string()),
        data,
    })
}
