//! Frame writer for the write half of the transport.
//!
//! Each frame is written as two slices (header block, JSON body) with
//! scatter/gather I/O and then flushed, so a request is fully drained to
//! the agent before the client starts reading for its response.

use std::io::IoSlice;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{CodyError, Result};
use crate::protocol::encode_header;

/// A frame ready to be written to the agent.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded `Content-Length` header block.
    pub header: Bytes,
    /// JSON body.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame around an encoded body.
    #[inline]
    pub fn new(payload: Bytes) -> Self {
        Self {
            header: Bytes::from(encode_header(payload.len())),
            payload,
        }
    }

    /// Serialize a value to compact JSON and frame it.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::new(Bytes::from(serde_json::to_vec(value)?)))
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        self.header.len() + self.payload.len()
    }
}

/// Writes frames to the write half of a transport.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a write half.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame and flush.
    ///
    /// Header and body go out with vectored writes, resumed after partial
    /// writes until the whole frame is drained.
    pub async fn send(&mut self, frame: &OutboundFrame) -> Result<()> {
        let total_size = frame.size();
        let mut total_written = 0;

        while total_written < total_size {
            let slices = remaining_slices(frame, total_written);
            let written = self.writer.write_vectored(&slices).await?;
            if written == 0 {
                return Err(CodyError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "write_vectored returned 0",
                )));
            }

            total_written += written;
        }

        self.writer.flush().await?;
        Ok(())
    }

    /// Serialize, frame, write and flush a value.
    pub async fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let frame = OutboundFrame::from_json(value)?;
        self.send(&frame).await
    }

    /// Shut down the write half, signalling EOF to the agent.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Consume the frame writer, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Build the IoSlices still to be written after `skip_bytes` went out.
fn remaining_slices(frame: &OutboundFrame, skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let header_len = frame.header.len();
    if skip_bytes < header_len {
        vec![
            IoSlice::new(&frame.header[skip_bytes..]),
            IoSlice::new(&frame.payload),
        ]
    } else {
        vec![IoSlice::new(&frame.payload[skip_bytes - header_len..])]
    }
}
