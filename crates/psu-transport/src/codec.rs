//! Line framing for SCPI replies
//!
//! Instruments terminate every reply with `\n` (often preceded by `\r`).
//! Byte streams from serial ports and sockets arrive in arbitrary chunks, so
//! transports push whatever they read into a [`LineCodec`] and pull complete
//! lines out of it.

use crate::error::TransportError;

/// Maximum reply length (reasonable limit to prevent unbounded buffering)
pub const MAX_LINE_LEN: usize = 4096;

/// Streaming newline-terminated line splitter
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new empty codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    /// Push raw bytes into the codec's buffer
    ///
    /// Fails and discards the partial line if it grows past [`MAX_LINE_LEN`]
    /// without a terminator.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.buffer.extend_from_slice(data);
        if !self.buffer.contains(&b'\n') && self.buffer.len() > MAX_LINE_LEN {
            self.buffer.clear();
            return Err(TransportError::LineTooLong { max: MAX_LINE_LEN });
        }
        Ok(())
    }

    /// Extract the next complete line, terminator included
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        Some(self.buffer.drain(..=end).collect())
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
