//! Frame struct and frame encoding.
//!
//! A [`Frame`] is one decoded body. Uses `bytes::Bytes` for zero-copy
//! payload sharing with the [`FrameBuffer`](super::FrameBuffer) it came from.
//!
//! # Example
//!
//! ```
//! use cody_agent_rpc::protocol::encode;
//! use serde_json::json;
//!
//! let bytes = encode(&json!({"a": 1})).unwrap();
//! assert_eq!(&bytes[..], b"Content-Length: 7\r\n\r\n{\"a\":1}");
//! ```

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::wire_format::encode_header;
use crate::error::Result;

/// A complete decoded frame body.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Body bytes, exactly `Content-Length` long.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from its body.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Parse the body as JSON.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Serialize a value to compact JSON and frame it.
///
/// Produces `"Content-Length: {L}\r\n\r\n" + json` where `L` is the byte
/// length of the JSON text.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    let json = serde_json::to_vec(value)?;
    Ok(Bytes::from(build_frame(&json)))
}

/// Build a complete frame around an already serialized body.
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    let header = encode_header(payload.len());
    let mut buf = Vec::with_capacity(header.len() + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    buf
}
