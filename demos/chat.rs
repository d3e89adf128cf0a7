//! Chat - one question to the Cody agent from the command line.
//!
//! This example demonstrates:
//! - Spawning the agent binary and talking JSON-RPC over its stdio
//! - Initializing a session and starting a chat
//! - Streaming in-progress updates through the notification channel
//!
//! # Running
//!
//! ```text
//! SRC_ACCESS_TOKEN=sgp_... RUST_LOG=cody_agent_rpc=debug \
//!     cargo run --example chat -- ./cody-agent "What does this repo do?"
//! ```

use std::process::Stdio;

use cody_agent_rpc::{ChatOptions, ClientBuilder, Notification, Session};
use serde_json::json;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(binary), Some(message)) = (args.next(), args.next()) else {
        eprintln!("usage: chat <agent-binary> <message>");
        std::process::exit(2);
    };

    let mut child = Command::new(&binary)
        .args(["api", "jsonrpc-stdio"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let stdin = child.stdin.take().ok_or("agent stdin not captured")?;
    let stdout = child.stdout.take().ok_or("agent stdout not captured")?;

    // Print streamed text as it arrives
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            if notification.is_in_progress() {
                tracing::info!("{}", notification.method);
            }
        }
    });

    let client = ClientBuilder::new()
        .log_method("debug/message", false)
        .notifications(tx)
        .build(stdout, stdin);
    let mut session = Session::new(client);

    let workspace = std::env::current_dir()?;
    session
        .initialize(json!({
            "name": "cody-agent-rpc",
            "version": env!("CARGO_PKG_VERSION"),
            "workspaceRootUri": format!("file://{}", workspace.display()),
            "extensionConfiguration": {
                "accessToken": std::env::var("SRC_ACCESS_TOKEN").unwrap_or_default(),
                "serverEndpoint": "https://sourcegraph.com",
                "codebase": "",
                "customConfiguration": {},
            },
        }))
        .await?;

    session.new_chat().await?;

    let options = ChatOptions {
        show_context_files: true,
        ..ChatOptions::default()
    };
    match session.chat(&message, &options).await? {
        Some(reply) => {
            println!("{}", reply.text);
            for file in reply.context_files {
                println!("  {}", file);
            }
        }
        None => eprintln!("no reply from agent"),
    }

    session.shutdown().await?;
    child.wait().await?;
    Ok(())
}
