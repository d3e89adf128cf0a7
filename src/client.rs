//! Client builder and request/response correlation.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring timeouts,
//! frame limits and the notification sink. The [`RpcClient`] owns both
//! halves of the transport and the request id counter:
//! 1. Assign the next id and send the request
//! 2. Read messages, surfacing notifications as they arrive
//! 3. Return the result of the first response, or `None` if the stream
//!    times out or closes first
//!
//! Responses are matched by arrival order, not by id. Only one request may
//! be outstanding per transport, which `&mut self` enforces.
//!
//! # Example
//!
//! ```ignore
//! use cody_agent_rpc::RpcClient;
//! use std::time::Duration;
//!
//! let mut client = RpcClient::builder()
//!     .read_timeout(Duration::from_secs(10))
//!     .log_method("debug/message", false)
//!     .build(child_stdout, child_stdin);
//!
//! let chat_id = client.request_response("chat/new", None).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::{Notification, RpcMessage};
use crate::protocol::{DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::transport::{FrameReader, FrameWriter, ReadOutcome, DEFAULT_READ_TIMEOUT};

/// JSON-RPC protocol version sent with every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Configuration for an [`RpcClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout applied to the header read and to the payload read of each cycle.
    pub read_timeout: Duration,
    /// Maximum accepted frame body size.
    pub max_payload_size: usize,
    /// Maximum header block size.
    pub max_header_size: usize,
    /// Per-method notification logging: `true` logs params at debug,
    /// `false` drops the method to trace. Unlisted methods log at debug.
    pub method_log_levels: HashMap<String, bool>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            method_log_levels: HashMap::new(),
        }
    }
}

/// A JSON-RPC request as written to the wire.
#[derive(Debug, Serialize)]
pub struct OutboundRequest<'a> {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request id, assigned at send time.
    pub id: u64,
    /// Method name.
    pub method: &'a str,
    /// Params, serialized as `null` when absent.
    pub params: Option<&'a Value>,
}

/// Monotonic request id counter.
///
/// Starts at 1. Ids are never reused, including ids consumed by a send
/// that failed.
#[derive(Debug, Clone)]
pub struct RequestIds {
    next: u64,
}

impl RequestIds {
    /// Create a counter starting at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a counter starting at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Take the next id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next request will get.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring and creating an [`RpcClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    notifications: Option<mpsc::UnboundedSender<Notification>>,
}

impl ClientBuilder {
    /// Create a new client builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            notifications: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-read timeout.
    ///
    /// Default: 5 seconds
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the maximum accepted frame body size.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, limit: usize) -> Self {
        self.config.max_payload_size = limit;
        self
    }

    /// Set the maximum header block size.
    ///
    /// Default: 8 KiB
    pub fn max_header_size(mut self, limit: usize) -> Self {
        self.config.max_header_size = limit;
        self
    }

    /// Choose whether notifications for `method` are logged with their params.
    pub fn log_method(mut self, method: &str, verbose: bool) -> Self {
        self.config
            .method_log_levels
            .insert(method.to_string(), verbose);
        self
    }

    /// Forward every notification to a channel, e.g. to stream chat progress.
    pub fn notifications(mut self, tx: mpsc::UnboundedSender<Notification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    /// Build a client over the given read and write halves.
    pub fn build<R, W>(self, reader: R, writer: W) -> RpcClient<R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        RpcClient {
            reader: FrameReader::with_limits(
                reader,
                self.config.max_payload_size,
                self.config.max_header_size,
            ),
            writer: FrameWriter::new(writer),
            ids: RequestIds::new(),
            config: self.config,
            notifications: self.notifications,
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON-RPC client over one agent transport.
pub struct RpcClient<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    ids: RequestIds,
    config: ClientConfig,
    notifications: Option<mpsc::UnboundedSender<Notification>>,
}

impl<R, W> RpcClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client with default configuration.
    pub fn new(reader: R, writer: W) -> Self {
        ClientBuilder::new().build(reader, writer)
    }

    /// Send a request without waiting for its response.
    ///
    /// Returns the id assigned to the request.
    pub async fn send_request(&mut self, method: &str, params: Option<&Value>) -> Result<u64> {
        let id = self.ids.next_id();
        let request = OutboundRequest {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        };

        tracing::debug!("Sending request {} ({})", id, method);
        self.writer.send_json(&request).await?;
        Ok(id)
    }

    /// Send one request and wait for the first response.
    ///
    /// Notifications received while waiting go to the log and the
    /// notification channel. Returns `Ok(None)` if the read times out or
    /// the agent closes the stream before any response arrives.
    ///
    /// # Errors
    ///
    /// Framing, JSON and I/O errors are propagated.
    pub async fn request_response(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Option<Value>> {
        let id = self.send_request(method, params.as_ref()).await?;

        let mut messages = self.reader.messages(self.config.read_timeout);
        while let Some(outcome) = messages.next().await? {
            match outcome {
                ReadOutcome::Message(RpcMessage::Notification(notification)) => {
                    surface(&self.config, self.notifications.as_ref(), notification);
                }
                ReadOutcome::Message(RpcMessage::Response { result }) => {
                    tracing::trace!("Result for request {} ({}): {}", id, method, result);
                    return Ok(Some(result));
                }
                ReadOutcome::Message(RpcMessage::Unrecognized { raw }) => {
                    tracing::trace!("Ignoring unrecognized message: {}", raw);
                }
                ReadOutcome::TimedOut | ReadOutcome::Closed => {
                    tracing::debug!("No result for request {} ({}): {:?}", id, method, outcome);
                }
            }
        }

        Ok(None)
    }

    /// Shut down the write half of the transport.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }

    /// The id the next request will get.
    pub fn next_id(&self) -> u64 {
        self.ids.peek()
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Consume the client, returning the read and write halves.
    pub fn into_parts(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }
}

/// Report a notification to the log and the notification channel.
fn surface(
    config: &ClientConfig,
    sink: Option<&mpsc::UnboundedSender<Notification>>,
    notification: Notification,
) {
    let verbose = config
        .method_log_levels
        .get(&notification.method)
        .copied()
        .unwrap_or(true);

    if notification.is_in_progress() {
        tracing::debug!("Streaming update in progress: {}", notification.method);
    } else if verbose {
        let params = notification.params.as_ref().unwrap_or(&Value::Null);
        tracing::debug!("Notification {}: {}", notification.method, params);
    } else {
        tracing::trace!("Notification {}", notification.method);
    }

    if let Some(tx) = sink {
        if tx.send(notification).is_err() {
            tracing::trace!("Notification receiver dropped");
        }
    }
}
