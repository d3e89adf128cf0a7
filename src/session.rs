//! Conversation session on top of an [`RpcClient`].
//!
//! A [`Session`] owns the client (and with it the request id counter), the
//! id of the current chat, the cache of resolved repository ids and the
//! repository context last applied to the chat.
//!
//! # Example
//!
//! ```ignore
//! use cody_agent_rpc::{ChatOptions, RpcClient, Session};
//!
//! let mut session = Session::new(RpcClient::new(stdout, stdin));
//! session.initialize(client_info).await?;
//! session.new_chat().await?;
//!
//! if let Some(reply) = session.chat("What does this crate do?", &ChatOptions::default()).await? {
//!     println!("{}", reply.text);
//! }
//! session.shutdown().await?;
//! ```

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::client::RpcClient;
use crate::context::ContextFile;
use crate::error::{CodyError, Result};
use crate::transcript::last_message;

/// Agent methods used by the session.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const SHUTDOWN: &str = "shutdown";
    pub const CHAT_NEW: &str = "chat/new";
    pub const CHAT_SUBMIT_MESSAGE: &str = "chat/submitMessage";
    pub const CHAT_MODELS: &str = "chat/models";
    pub const WEBVIEW_RECEIVE_MESSAGE: &str = "webview/receiveMessage";
    pub const GRAPHQL_GET_REPO_IDS: &str = "graphql/getRepoIds";
}

/// Chat inputs that end the conversation locally.
pub const QUIT_COMMANDS: [&str; 3] = ["/quit", "/bye", "/exit"];

/// A cached repository lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum RepoEntry {
    /// Repository object returned by the agent.
    Resolved(Value),
    /// The agent did not know the name; never looked up again.
    NotFound,
}

/// Append-only cache of repository lookups, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RepoCache {
    entries: Vec<(String, RepoEntry)>,
    index: HashMap<String, usize>,
}

impl RepoCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lookup. The first entry for a name is kept.
    pub fn insert(&mut self, name: &str, entry: RepoEntry) {
        if self.index.contains_key(name) {
            return;
        }
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push((name.to_string(), entry));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RepoEntry> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Names from `names` with no cache entry, deduplicated, in request order.
    pub fn uncached(&self, names: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for name in names {
            if !self.contains(name) && seen.insert(name.as_str()) {
                missing.push(name.clone());
            }
        }
        missing
    }

    /// Resolved objects for the requested names, in insertion order.
    pub fn resolved(&self, names: &[String]) -> Vec<Value> {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.entries
            .iter()
            .filter(|(name, _)| wanted.contains(name.as_str()))
            .filter_map(|(_, entry)| match entry {
                RepoEntry::Resolved(repo) => Some(repo.clone()),
                RepoEntry::NotFound => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Options for [`Session::chat`].
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Let the agent add context from the codebase.
    pub enhanced_context: bool,
    /// Collect the context files cited in the transcript.
    pub show_context_files: bool,
    /// Files attached to the message.
    pub context_files: Vec<ContextFile>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            enhanced_context: true,
            show_context_files: false,
            context_files: Vec::new(),
        }
    }
}

/// The agent's answer to a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    /// Rendered `path:start-end` refs, empty unless requested.
    pub context_files: Vec<String>,
}

/// A conversation with the agent over one transport.
pub struct Session<R, W> {
    client: RpcClient<R, W>,
    chat_id: Option<String>,
    repos: RepoCache,
    repo_context: Vec<String>,
    closed: bool,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Start a session over a client.
    pub fn new(client: RpcClient<R, W>) -> Self {
        Self {
            client,
            chat_id: None,
            repos: RepoCache::new(),
            repo_context: Vec::new(),
            closed: false,
        }
    }

    /// Send `initialize` with the client's info and capabilities.
    ///
    /// Returns the agent's server info.
    ///
    /// # Errors
    ///
    /// If the agent does not answer or reports `authenticated: false`, the
    /// session sends `shutdown`, closes the transport and returns
    /// [`CodyError::Unauthenticated`].
    pub async fn initialize(&mut self, client_info: Value) -> Result<Value> {
        self.ensure_open()?;

        let result = self
            .client
            .request_response(methods::INITIALIZE, Some(client_info))
            .await?;

        match result {
            Some(info) if info.get("authenticated").and_then(Value::as_bool) == Some(true) => {
                tracing::info!("Agent initialized");
                tracing::debug!("Agent info: {}", info);
                Ok(info)
            }
            other => {
                tracing::error!("Agent is not authenticated: {:?}", other);
                self.teardown().await;
                Err(CodyError::Unauthenticated)
            }
        }
    }

    /// Start a new chat and remember its id.
    pub async fn new_chat(&mut self) -> Result<String> {
        self.ensure_open()?;

        let result = self.client.request_response(methods::CHAT_NEW, None).await?;
        let chat_id = result
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| CodyError::NoResult {
                method: methods::CHAT_NEW.to_string(),
            })?
            .to_string();

        tracing::info!("Created chat {}", chat_id);
        self.chat_id = Some(chat_id.clone());
        Ok(chat_id)
    }

    /// Resolve repository names to the agent's repository objects.
    ///
    /// Only names missing from the cache are looked up, in one batched
    /// request. Names the agent does not return are cached as not found.
    ///
    /// # Errors
    ///
    /// [`CodyError::NoResult`] if the lookup ends without a `repos` list;
    /// nothing is cached in that case.
    pub async fn lookup_repo_ids(&mut self, names: &[String]) -> Result<Vec<Value>> {
        self.ensure_open()?;

        let missing = self.repos.uncached(names);
        if !missing.is_empty() {
            let params = json!({"names": missing, "first": missing.len()});
            let result = self
                .client
                .request_response(methods::GRAPHQL_GET_REPO_IDS, Some(params))
                .await?;

            let repos = result
                .as_ref()
                .and_then(|r| r.get("repos"))
                .and_then(Value::as_array)
                .ok_or_else(|| CodyError::NoResult {
                    method: methods::GRAPHQL_GET_REPO_IDS.to_string(),
                })?;

            for repo in repos {
                match repo.get("name").and_then(Value::as_str) {
                    Some(name) => self.repos.insert(name, RepoEntry::Resolved(repo.clone())),
                    None => tracing::warn!("Repository without a name: {}", repo),
                }
            }
            for name in &missing {
                if !self.repos.contains(name) {
                    tracing::debug!("Repository {} not found", name);
                    self.repos.insert(name, RepoEntry::NotFound);
                }
            }
        }

        Ok(self.repos.resolved(names))
    }

    /// Use the given repositories as remote search context for the chat.
    ///
    /// Does nothing if they are already the current context.
    pub async fn set_context_repos(&mut self, repos: &[String]) -> Result<()> {
        self.ensure_open()?;
        if self.repo_context == repos {
            return Ok(());
        }

        let repo_objects = self.lookup_repo_ids(repos).await?;
        let params = json!({
            "id": self.chat_id,
            "message": {
                "command": "context/choose-remote-search-repo",
                "explicitRepos": repo_objects,
            },
        });
        self.client
            .request_response(methods::WEBVIEW_RECEIVE_MESSAGE, Some(params))
            .await?;

        self.repo_context = repos.to_vec();
        Ok(())
    }

    /// List the models available for a usage, `"chat"` or `"edit"`.
    pub async fn get_models(&mut self, usage: &str) -> Result<Option<Value>> {
        self.ensure_open()?;

        self.client
            .request_response(methods::CHAT_MODELS, Some(json!({"modelUsage": usage})))
            .await
    }

    /// Switch the chat to another model.
    pub async fn set_model(&mut self, model_id: &str) -> Result<Option<Value>> {
        self.ensure_open()?;

        let params = json!({
            "id": self.chat_id,
            "message": {"command": "chatModel", "model": model_id},
        });
        self.client
            .request_response(methods::WEBVIEW_RECEIVE_MESSAGE, Some(params))
            .await
    }

    /// Submit a chat message and return the agent's reply.
    ///
    /// The quit commands return an empty reply without contacting the
    /// agent. Returns `Ok(None)` when the agent's answer holds no usable
    /// reply.
    pub async fn chat(&mut self, message: &str, options: &ChatOptions) -> Result<Option<ChatReply>> {
        if QUIT_COMMANDS.contains(&message) {
            return Ok(Some(ChatReply::default()));
        }
        self.ensure_open()?;

        let params = json!({
            "id": self.chat_id,
            "message": {
                "command": "submit",
                "text": message,
                "submitType": "user",
                "addEnhancedContext": options.enhanced_context,
                "contextFiles": serde_json::to_value(&options.context_files)?,
            },
        });
        let result = self
            .client
            .request_response(methods::CHAT_SUBMIT_MESSAGE, Some(params))
            .await?;

        let last = result
            .as_ref()
            .map(|r| last_message(r, options.show_context_files))
            .unwrap_or_default();
        if last.is_empty() {
            tracing::error!("Failed to submit chat message: {:?}", result);
            return Ok(None);
        }

        Ok(Some(ChatReply {
            text: last.text,
            context_files: last.context_files,
        }))
    }

    /// Ask the agent to shut down and close the transport.
    pub async fn shutdown(mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        self.client.send_request(methods::SHUTDOWN, None).await?;
        self.client.close().await
    }

    /// Id of the current chat, once `new_chat` succeeded.
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Repositories last applied as chat context.
    pub fn repo_context(&self) -> &[String] {
        &self.repo_context
    }

    pub fn repo_cache(&self) -> &RepoCache {
        &self.repos
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Access the client for requests the session does not wrap.
    pub fn client_mut(&mut self) -> Result<&mut RpcClient<R, W>> {
        self.ensure_open()?;
        Ok(&mut self.client)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CodyError::ConnectionClosed);
        }
        Ok(())
    }

    /// Best-effort shutdown after a fatal session error.
    async fn teardown(&mut self) {
        self.closed = true;

        if let Err(e) = self.client.send_request(methods::SHUTDOWN, None).await {
            tracing::warn!("Failed to send shutdown: {}", e);
        }
        if let Err(e) = self.client.close().await {
            tracing::warn!("Failed to close transport: {}", e);
        }
    }
}
