//! Length-prefix frame codec.
//!
//! Wire format:
//! ```text
//! ┌────────────┬───────────────────────────┐
//! │ Length (4B)│ JSON Envelope (N B)       │
//! │ LE u32     │                           │
//! └────────────┴───────────────────────────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete frames.
//! A single `read` may return part of the header, part of the payload,
//! or several frames back to back; every complete frame is handed to
//! the caller.

use log::warn;

use super::Envelope;
use crate::error::LinkError;

/// Maximum frame payload size (protects against memory exhaustion).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Frame header size (4-byte little-endian length).
const HEADER_SIZE: usize = 4;

enum DecoderState {
    ReadingHeader { collected: usize },
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload: Vec<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload: Vec::new(),
        }
    }

    /// Feed bytes into the decoder, calling `on_frame` for every frame
    /// payload completed by them.
    ///
    /// A zero or oversized length resets the decoder to header search.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(&[u8])) {
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let to_copy = (HEADER_SIZE - *collected).min(data.len() - offset);
                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let expected = u32::from_le_bytes(self.header_buf) as usize;
                        if expected == 0 || expected > MAX_FRAME_SIZE {
                            warn!("CODEC: invalid frame length {}, resyncing", expected);
                            self.state = DecoderState::ReadingHeader { collected: 0 };
                            continue;
                        }
                        self.payload.clear();
                        self.payload.reserve(expected);
                        self.state = DecoderState::ReadingPayload { expected };
                    }
                }

                DecoderState::ReadingPayload { expected } => {
                    let expected = *expected;
                    let to_copy = (expected - self.payload.len()).min(data.len() - offset);
                    self.payload
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    if self.payload.len() == expected {
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        on_frame(&self.payload);
                    }
                }
            }
        }
    }

    /// Reset decoder state (e.g. after a peer restart).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload.clear();
    }
}

/// Prefix `payload` with its little-endian length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, LinkError> {
    if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
        return Err(LinkError::Codec(format!(
            "payload of {} bytes out of range",
            payload.len()
        )));
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Serialise an envelope into one complete frame.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, LinkError> {
    let json = serde_json::to_vec(envelope).map_err(|e| LinkError::Codec(e.to_string()))?;
    encode_frame(&json)
}

/// Parse one frame payload.
pub fn decode_envelope(payload: &[u8]) -> Result<Envelope, LinkError> {
    serde_json::from_slice(payload).map_err(|e| LinkError::Codec(e.to_string()))
}
