//! # cody-agent-rpc
//!
//! Rust client SDK for the Cody agent's JSON-RPC interface.
//!
//! The agent runs as a child process and speaks JSON-RPC over its stdio,
//! one message per `Content-Length` framed block.
//!
//! ## Architecture
//!
//! - **Protocol**: frame encoding and incremental frame parsing
//! - **Transport**: timed frame reads and vectored frame writes
//! - **Client**: request ids, request/response correlation and notifications
//! - **Session**: chat, model and repository context operations
//!
//! ## Example
//!
//! ```ignore
//! use cody_agent_rpc::{ChatOptions, RpcClient, Session};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RpcClient::builder()
//!         .log_method("debug/message", false)
//!         .build(child_stdout, child_stdin);
//!
//!     let mut session = Session::new(client);
//!     session.initialize(json!({"name": "example", "version": "0.1.0"})).await?;
//!     session.new_chat().await?;
//!
//!     let reply = session.chat("Hello", &ChatOptions::default()).await?;
//!     println!("{:?}", reply);
//!
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod context;
pub mod error;
pub mod message;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod transport;

pub use client::{ClientBuilder, ClientConfig, RpcClient};
pub use context::ContextFile;
pub use error::{CodyError, Result};
pub use message::{Notification, RpcMessage};
pub use session::{ChatOptions, ChatReply, RepoCache, Session};
pub use transcript::{last_message, LastMessage};
pub use transport::{FrameReader, FrameWriter, ReadOutcome};
