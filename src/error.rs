//! Error types for cody-agent-rpc.

use thiserror::Error;

/// Main error type for all agent client operations.
#[derive(Debug, Error)]
pub enum CodyError {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed frame (missing or invalid `Content-Length`, oversized frame).
    ///
    /// Fatal for the current read cycle. The stream is not resynchronized.
    #[error("Framing error: {0}")]
    Framing(String),

    /// No data arrived within the read timeout.
    ///
    /// The reader loop turns this into [`ReadOutcome::TimedOut`](crate::transport::ReadOutcome::TimedOut);
    /// it is never returned from `request_response`.
    #[error("Read timed out")]
    Timeout,

    /// The agent reported that it is not authenticated.
    #[error("Agent is not authenticated")]
    Unauthenticated,

    /// The session was torn down and its transport released.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A request that must produce a result ended without one.
    #[error("No result for {method}")]
    NoResult {
        /// Method of the request that went unanswered.
        method: String,
    },
}

/// Result type alias using CodyError.
pub type Result<T> = std::result::Result<T, CodyError>;
