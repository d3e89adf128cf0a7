//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need a complete header block ending in `\r\n\r\n`
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! # Example
//!
//! ```
//! use cody_agent_rpc::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in chunks from the agent's stdout
//! assert!(buffer.push(b"Content-Length: 2\r\n").unwrap().is_empty());
//! let frames = buffer.push(b"\r\n{}").unwrap();
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].payload(), b"{}");
//! ```

use bytes::BytesMut;

use super::wire_format::{
    find_header_end, parse_content_length, DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE,
    HEADER_TERMINATOR,
};
use super::Frame;
use crate::error::{CodyError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete header block.
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// Partial frames stay buffered until complete; only whole frames are
/// returned.
pub struct FrameBuffer {
    /// Accumulated bytes from stream reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Bytes already scanned for the header terminator.
    scanned: usize,
    /// Maximum allowed payload size.
    max_payload_size: usize,
    /// Maximum header block size.
    max_header_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default limits.
    ///
    /// Default capacity: 64KB, max payload: 64MB, max header: 8KB.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_HEADER_SIZE)
    }

    /// Create a new frame buffer with custom limits.
    pub fn with_limits(max_payload_size: usize, max_header_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            scanned: 0,
            max_payload_size,
            max_header_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns a vector of complete frames. If data is fragmented,
    /// partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns [`CodyError::Framing`] on a malformed header or a frame
    /// exceeding the configured limits.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Append data to the buffer without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    pub fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match self.state {
            State::WaitingForHeader => {
                // Resume the scan just before where the last one stopped, the
                // terminator may straddle two reads.
                let from = self.scanned.saturating_sub(HEADER_TERMINATOR.len() - 1);
                let header_end = match find_header_end(&self.buffer[from..]) {
                    Some(offset) => from + offset,
                    None => {
                        self.scanned = self.buffer.len();
                        if self.buffer.len() > self.max_header_size {
                            return Err(CodyError::Framing(format!(
                                "Header block exceeds {} bytes without terminator",
                                self.max_header_size
                            )));
                        }
                        return Ok(None);
                    }
                };

                let content_length = parse_content_length(&self.buffer[..header_end])?;
                if content_length > self.max_payload_size {
                    return Err(CodyError::Framing(format!(
                        "Payload size {} exceeds maximum {}",
                        content_length, self.max_payload_size
                    )));
                }

                // Consume header block and terminator
                let _ = self.buffer.split_to(header_end + HEADER_TERMINATOR.len());
                self.scanned = 0;

                self.state = State::WaitingForPayload {
                    remaining: content_length,
                };

                // Try to get payload immediately
                self.try_extract_one()
            }

            State::WaitingForPayload { remaining } => {
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(payload)))
            }
        }
    }

    /// Whether a header has been parsed and the payload is still incomplete.
    pub fn is_awaiting_payload(&self) -> bool {
        matches!(self.state, State::WaitingForPayload { .. })
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.state = State::WaitingForHeader;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
