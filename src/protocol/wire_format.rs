//! Wire format for the agent protocol.
//!
//! Every message, in both directions, is a text header block followed by
//! a UTF-8 JSON body:
//!
//! ```text
//! Content-Length: <decimal byte length>\r\n
//! \r\n
//! <JSON body of exactly that many bytes>
//! ```
//!
//! No other headers are written. When reading, only the first
//! `Content-Length:` occurrence in the header block is used.

use crate::error::{CodyError, Result};

/// Header key carrying the body length (case-sensitive).
pub const CONTENT_LENGTH: &str = "Content-Length:";

/// Byte sequence terminating the header block.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Default maximum body size (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Default maximum header block size before a terminator must appear (8 KiB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

/// Encode the header block for a body of `payload_length` bytes.
///
/// # Example
///
/// ```
/// use cody_agent_rpc::protocol::encode_header;
///
/// assert_eq!(encode_header(42), b"Content-Length: 42\r\n\r\n");
/// ```
pub fn encode_header(payload_length: usize) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n", payload_length).into_bytes()
}

/// Find the end of the header block.
///
/// Returns the offset of the first `\r\n\r\n`, or `None` if the buffer
/// does not contain a complete header block yet.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Parse the body length out of a header block (terminator excluded).
///
/// The value runs from the first `Content-Length:` up to the next `\r\n`
/// (or the end of the block) and must be a non-negative decimal integer.
///
/// # Errors
///
/// Returns [`CodyError::Framing`] if the block is not UTF-8, the key is
/// missing, or the value is not an integer.
pub fn parse_content_length(header_block: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(header_block)
        .map_err(|_| CodyError::Framing("Header block is not valid UTF-8".to_string()))?;

    let start = text
        .find(CONTENT_LENGTH)
        .ok_or_else(|| CodyError::Framing(format!("Missing Content-Length in {:?}", text)))?;

    let value = &text[start + CONTENT_LENGTH.len()..];
    let value = match value.find("\r\n") {
        Some(end) => &value[..end],
        None => value,
    };

    value.trim().parse::<usize>().map_err(|_| {
        CodyError::Framing(format!("Invalid Content-Length value {:?}", value.trim()))
    })
}
