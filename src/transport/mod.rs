//! Transport module - framed reads and writes over any async byte stream.
//!
//! The agent is reached through a read half and a write half: a child
//! process's stdout/stdin, a TCP stream split in two, or an in-memory
//! `tokio::io::duplex` pipe in tests. Spawning and connecting are left to
//! the caller.

mod reader;
mod writer;

pub use reader::{FrameReader, Messages, ReadOutcome, DEFAULT_READ_TIMEOUT};
pub use writer::{FrameWriter, OutboundFrame};
