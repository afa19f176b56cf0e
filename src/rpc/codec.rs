//! Length-prefix frame codec.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ postcard payload (N B)   │
//! │ LE u32     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! The decoder accumulates incoming bytes and hands out every complete
//! frame. A single `TransportRx::read` may return part of a header, part
//! of a payload, or several frames back to back.

use crate::error::CodecError;

/// Maximum frame payload size (protects against memory exhaustion).
pub const MAX_FRAME_SIZE: usize = 4096;

/// Frame header size (4-byte little-endian length).
pub const HEADER_SIZE: usize = 4;

enum DecoderState {
    ReadingHeader { collected: usize },
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload: Vec<u8>,
    /// Frames discarded because of an invalid length header.
    rejected: u32,
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
            rejected: 0,
        }
    }

    /// Feed bytes into the decoder, calling `on_frame` for every complete
    /// payload. Returns the number of frames delivered.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(&[u8])) -> usize {
        let mut offset = 0;
        let mut frames = 0;

        while offset < data.len() {
            match self.state {
                DecoderState::ReadingHeader { collected } => {
                    let to_copy = (HEADER_SIZE - collected).min(data.len() - offset);
                    self.header_buf[collected..collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    let collected = collected + to_copy;
                    if collected < HEADER_SIZE {
                        self.state = DecoderState::ReadingHeader { collected };
                        continue;
                    }

                    let expected = u32::from_le_bytes(self.header_buf) as usize;
                    if expected == 0 || expected > MAX_FRAME_SIZE {
                        // Invalid length: drop the header and resync.
                        self.rejected = self.rejected.saturating_add(1);
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        continue;
                    }

                    self.payload.clear();
                    self.payload.reserve(expected);
                    self.state = DecoderState::ReadingPayload { expected };
                }

                DecoderState::ReadingPayload { expected } => {
                    let to_copy = (expected - self.payload.len()).min(data.len() - offset);
                    self.payload
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    if self.payload.len() == expected {
                        on_frame(&self.payload);
                        frames += 1;
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                    }
                }
            }
        }

        frames
    }

    /// Reset decoder state (e.g. after a transport reopen).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload.clear();
    }

    pub fn rejected_count(&self) -> u32 {
        self.rejected
    }
}

/// Encode a payload into a length-prefixed frame `[LE-u32 length][payload]`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}
