//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the agent's framing:
//! - `Content-Length` header block encoding/parsing
//! - Frame buffer for accumulating partial reads
//! - Frame struct and JSON frame encoding

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, encode, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    encode_header, find_header_end, parse_content_length, CONTENT_LENGTH,
    DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_TERMINATOR,
};
