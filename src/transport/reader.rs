//! Reader loop: frames in, classified messages out.
//!
//! [`FrameReader`] owns the read half of the transport together with a
//! [`FrameBuffer`], so bytes that arrived ahead of the current frame survive
//! across read cycles. Each cycle applies the read timeout twice: once while
//! waiting for the header block and again, from scratch, while waiting for
//! the payload.
//!
//! [`Messages`] is the lazy sequence on top. It ends after one terminal
//! outcome ([`ReadOutcome::TimedOut`] or [`ReadOutcome::Closed`]) or an
//! error, and can be restarted by calling [`FrameReader::messages`] again.
//!
//! # Example
//!
//! ```ignore
//! let mut reader = FrameReader::new(stdout);
//! let mut messages = reader.messages(Duration::from_secs(5));
//!
//! while let Some(outcome) = messages.next().await? {
//!     if let ReadOutcome::Message(msg) = outcome {
//!         println!("{:?}", msg);
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::error::{CodyError, Result};
use crate::message::RpcMessage;
use crate::protocol::{Frame, FrameBuffer, DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE};

/// Default per-read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of a single socket/pipe read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Result of one read cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// A complete, classified message.
    Message(RpcMessage),
    /// No data within the timeout. No further data, no error.
    TimedOut,
    /// The agent closed its end of the stream.
    Closed,
}

/// Decodes frames from the read half of a transport.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    read_buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a frame reader with default frame limits.
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_HEADER_SIZE)
    }

    /// Create a frame reader with custom frame limits.
    pub fn with_limits(reader: R, max_payload_size: usize, max_header_size: usize) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::with_limits(max_payload_size, max_header_size),
            read_buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` when the stream reaches EOF. A partial frame
    /// pending at EOF is discarded, never surfaced.
    ///
    /// # Errors
    ///
    /// - [`CodyError::Timeout`] if the header or the payload does not
    ///   arrive within `timeout`
    /// - [`CodyError::Framing`] on a malformed header
    /// - [`CodyError::Io`] if the read fails
    pub async fn decode_one(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let mut awaiting_payload = self.buffer.is_awaiting_payload();
        let mut deadline = Instant::now() + timeout;

        loop {
            if let Some(frame) = self.buffer.try_extract_one()? {
                return Ok(Some(frame));
            }

            if self.buffer.is_awaiting_payload() != awaiting_payload {
                awaiting_payload = !awaiting_payload;
                deadline = Instant::now() + timeout;
            }

            let read = tokio::time::timeout_at(deadline, self.reader.read(&mut self.read_buf));
            let n = match read.await {
                Ok(Ok(0)) => {
                    if !self.buffer.is_empty() || awaiting_payload {
                        tracing::debug!(
                            "Stream closed with {} bytes of an incomplete frame",
                            self.buffer.len()
                        );
                    }
                    return Ok(None);
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(CodyError::Io(e)),
                Err(_) => return Err(CodyError::Timeout),
            };

            self.buffer.extend(&self.read_buf[..n]);
        }
    }

    /// Run one read cycle and classify the result.
    pub async fn read_message(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        match self.decode_one(timeout).await {
            Ok(Some(frame)) => Ok(ReadOutcome::Message(RpcMessage::classify(frame.to_json()?))),
            Ok(None) => Ok(ReadOutcome::Closed),
            Err(CodyError::Timeout) => {
                tracing::debug!("No message from agent within {:?}", timeout);
                Ok(ReadOutcome::TimedOut)
            }
            Err(e) => Err(e),
        }
    }

    /// Start a message sequence with the given per-read timeout.
    pub fn messages(&mut self, timeout: Duration) -> Messages<'_, R> {
        Messages {
            reader: self,
            timeout,
            done: false,
        }
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consume the frame reader, returning the underlying reader.
    ///
    /// Any buffered bytes are dropped.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Lazy sequence of messages from a [`FrameReader`].
///
/// Only one decode is in flight at a time: the sequence borrows the reader
/// mutably for its whole lifetime.
pub struct Messages<'a, R> {
    reader: &'a mut FrameReader<R>,
    timeout: Duration,
    done: bool,
}

impl<R: AsyncRead + Unpin> Messages<'_, R> {
    /// Get the next outcome, or `Ok(None)` once the sequence has ended.
    ///
    /// `TimedOut` and `Closed` are yielded exactly once, as the last item.
    /// An error is returned once and also ends the sequence.
    pub async fn next(&mut self) -> Result<Option<ReadOutcome>> {
        if self.done {
            return Ok(None);
        }

        match self.reader.read_message(self.timeout).await {
            Ok(outcome) => {
                if !matches!(outcome, ReadOutcome::Message(_)) {
                    self.done = true;
                }
                Ok(Some(outcome))
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Whether the sequence has ended.
    pub fn is_done(&self) -> bool {
        self.done
    }
}
