//! SLIP framing of the sniffer's serial stream
//!
//! # Format
//! - Start of frame: `0xAB`
//! - End of frame: `0xBC`
//! - Escape: `0xCD`, followed by `0xAC` (start), `0xBD` (end) or `0xCE`
//!   (escape)
//!
//! Bytes outside a start/end pair are line noise and are discarded.

use tracing::warn;

use crate::error::SlipError;

pub const SLIP_START: u8 = 0xAB;
pub const SLIP_END: u8 = 0xBC;
pub const SLIP_ESC: u8 = 0xCD;
pub const SLIP_ESC_START: u8 = 0xAC;
pub const SLIP_ESC_END: u8 = 0xBD;
pub const SLIP_ESC_ESC: u8 = 0xCE;

/// Largest encoded frame the codec will hold (every byte escaped)
const MAX_FRAME_LEN: usize = 256;

/// Streaming SLIP decoder
pub struct SlipCodec {
    buffer: Vec<u8>,
}

impl SlipCodec {
    /// Create a new SLIP codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Unescape the bytes between a start and an end marker
    fn unescape(encoded: &[u8]) -> Result<Vec<u8>, SlipError> {
        let mut decoded = Vec::with_capacity(encoded.len());
        let mut bytes = encoded.iter();
        while let Some(&byte) = bytes.next() {
            if byte != SLIP_ESC {
                decoded.push(byte);
                continue;
            }
            match bytes.next() {
                Some(&SLIP_ESC_START) => decoded.push(SLIP_START),
                Some(&SLIP_ESC_END) => decoded.push(SLIP_END),
                Some(&SLIP_ESC_ESC) => decoded.push(SLIP_ESC),
                Some(&other) => return Err(SlipError::InvalidEscape(other)),
                None => return Err(SlipError::InvalidEscape(SLIP_END)),
            }
        }
        Ok(decoded)
    }

    /// Add received bytes to the internal buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Keep memory bounded when no end marker arrives
        if self.buffer.len() > MAX_FRAME_LEN * 4 {
            let start = self.buffer.len() - MAX_FRAME_LEN;
            warn!("Dropping {} buffered bytes: {}", start, SlipError::FrameTooLong(MAX_FRAME_LEN));
            self.buffer.drain(..start);
        }
    }

    /// Next decoded frame, if one is complete
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.next_frame_with_bytes().map(|(frame, _)| frame)
    }

    /// Next decoded frame together with the raw bytes it was decoded from
    ///
    /// Frames with an invalid escape sequence are dropped and the search
    /// continues with the following frame.
    pub fn next_frame_with_bytes(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        loop {
            let start = self.buffer.iter().position(|&b| b == SLIP_START)?;
            if start > 0 {
                self.buffer.drain(..start);
            }

            let end = self.buffer.iter().position(|&b| b == SLIP_END)?;
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();

            // A start marker inside the frame means the previous one was cut off
            let body_start = raw[..end].iter().rposition(|&b| b == SLIP_START).unwrap_or(0) + 1;

            match Self::unescape(&raw[body_start..end]) {
                Ok(frame) => return Some((frame, raw)),
                Err(e) => warn!("Failed to decode SLIP frame: {}", e),
            }
        }
    }

    /// Discard all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for SlipCodec {
    fn default() -> Self {
        Self::new()
    }
}
