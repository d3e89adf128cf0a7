//! Integration tests for cody-agent-rpc.
//!
//! These tests run a session against a scripted fake agent on the other
//! end of an in-memory duplex pipe.

use cody_agent_rpc::protocol::{encode, FrameBuffer};
use cody_agent_rpc::transport::{FrameReader, FrameWriter, ReadOutcome};
use cody_agent_rpc::{
    ChatOptions, ChatReply, ClientBuilder, CodyError, ContextFile, RpcMessage, Session,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type TestSession = Session<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

fn connect(builder: ClientBuilder) -> (TestSession, DuplexStream) {
    let (client_end, agent_end) = duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(client_end);
    (Session::new(builder.build(reader, writer)), agent_end)
}

/// Read the next request frame, or `None` once the client closed its side.
async fn recv(stream: &mut DuplexStream, buffer: &mut FrameBuffer) -> Option<Value> {
    let mut buf = [0u8; 4096];
    loop {
        if let Some(frame) = buffer.try_extract_one().unwrap() {
            return Some(frame.to_json().unwrap());
        }
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            return None;
        }
        buffer.extend(&buf[..n]);
    }
}

/// Run a fake agent that answers each request with the messages `respond`
/// returns. Yields every request it received once the client closes or
/// stops reading.
fn spawn_agent<F>(mut stream: DuplexStream, respond: F) -> JoinHandle<Vec<Value>>
where
    F: Fn(&Value) -> Vec<Value> + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = FrameBuffer::new();
        let mut requests = Vec::new();

        while let Some(request) = recv(&mut stream, &mut buffer).await {
            let replies = respond(&request);
            requests.push(request);
            for reply in replies {
                // The client may already be gone, e.g. after `shutdown`
                if stream.write_all(&encode(&reply).unwrap()).await.is_err() {
                    return requests;
                }
            }
        }

        requests
    })
}

fn result_for(request: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
}

fn methods(requests: &[Value]) -> Vec<&str> {
    requests
        .iter()
        .map(|r| r["method"].as_str().unwrap())
        .collect()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn transcript(text: &str) -> Value {
    json!({
        "type": "transcript",
        "messages": [
            {"speaker": "human", "text": "What is this?"},
            {
                "speaker": "assistant",
                "text": text,
                "contextFiles": [
                    {"uri": {"path": "/repo/src/lib.rs"}, "range": {"start": {"line": 1}, "end": {"line": 12}}}
                ]
            }
        ]
    })
}

/// A well-behaved agent covering every method the session uses.
fn agent_responses(request: &Value) -> Vec<Value> {
    match request["method"].as_str().unwrap_or_default() {
        "initialize" => vec![result_for(
            request,
            json!({"name": "cody-agent", "authenticated": true}),
        )],
        "chat/new" => vec![result_for(request, json!("chat-42"))],
        "chat/submitMessage" => vec![
            json!({
                "jsonrpc": "2.0",
                "method": "chat/updateMessageInProgress",
                "params": {"isMessageInProgress": true, "text": "A cli"}
            }),
            json!({"jsonrpc": "2.0", "method": "debug/message", "params": {"message": "thinking"}}),
            result_for(request, transcript("A client library.")),
        ],
        "chat/models" => vec![result_for(
            request,
            json!({"models": [{"model": "anthropic/claude-3-sonnet"}]}),
        )],
        "graphql/getRepoIds" => {
            let repos: Vec<Value> = request["params"]["names"]
                .as_array()
                .unwrap()
                .iter()
                .filter(|n| n.as_str() != Some("missing"))
                .map(|n| json!({"name": n, "id": format!("id-{}", n.as_str().unwrap())}))
                .collect();
            vec![result_for(request, json!({"repos": repos}))]
        }
        "webview/receiveMessage" => vec![result_for(request, Value::Null)],
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn test_frame_round_trip_over_transport() {
    let (client_end, agent_end) = duplex(1024);
    let mut writer = FrameWriter::new(client_end);
    let mut reader = FrameReader::new(agent_end);

    writer
        .send_json(&json!({"id": 3, "result": {"text": "hé"}}))
        .await
        .unwrap();
    writer.close().await.unwrap();

    let outcome = reader.read_message(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        outcome,
        ReadOutcome::Message(RpcMessage::Response {
            result: json!({"text": "hé"})
        })
    );
    assert_eq!(
        reader.read_message(Duration::from_secs(1)).await.unwrap(),
        ReadOutcome::Closed
    );
}

#[tokio::test]
async fn test_full_conversation() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (mut session, agent) = connect(ClientBuilder::new().notifications(tx));
    let agent_task = spawn_agent(agent, agent_responses);

    let info = session
        .initialize(json!({"name": "tests", "version": "0.1.0"}))
        .await
        .unwrap();
    assert_eq!(info["name"], "cody-agent");

    let chat_id = session.new_chat().await.unwrap();
    assert_eq!(chat_id, "chat-42");
    assert_eq!(session.chat_id(), Some("chat-42"));

    let options = ChatOptions {
        show_context_files: true,
        ..ChatOptions::default()
    };
    let reply = session.chat("What is this?", &options).await.unwrap();
    assert_eq!(
        reply,
        Some(ChatReply {
            text: "A client library.".to_string(),
            context_files: vec!["/repo/src/lib.rs:1-12".to_string()],
        })
    );

    let streamed = rx.recv().await.unwrap();
    assert_eq!(streamed.method, "chat/updateMessageInProgress");
    assert!(streamed.is_in_progress());
    assert_eq!(rx.recv().await.unwrap().method, "debug/message");

    session.shutdown().await.unwrap();
    let requests = agent_task.await.unwrap();

    assert_eq!(
        methods(&requests),
        vec!["initialize", "chat/new", "chat/submitMessage", "shutdown"]
    );
    let ids: Vec<u64> = requests.iter().map(|r| r["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(requests.iter().all(|r| r["jsonrpc"] == "2.0"));
    assert_eq!(requests[1]["params"], Value::Null);
    assert_eq!(
        requests[2]["params"],
        json!({
            "id": "chat-42",
            "message": {
                "command": "submit",
                "text": "What is this?",
                "submitType": "user",
                "addEnhancedContext": true,
                "contextFiles": []
            }
        })
    );
}

#[tokio::test]
async fn test_chat_sends_context_files() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, agent_responses);

    let options = ChatOptions {
        enhanced_context: false,
        context_files: vec![ContextFile::from_path("Cargo.toml")],
        ..ChatOptions::default()
    };
    let reply = session.chat("Explain", &options).await.unwrap().unwrap();
    assert_eq!(reply.text, "A client library.");
    assert!(reply.context_files.is_empty());

    session.shutdown().await.unwrap();
    let requests = agent_task.await.unwrap();

    let message = &requests[0]["params"]["message"];
    assert_eq!(message["addEnhancedContext"], false);
    assert_eq!(message["contextFiles"][0]["type"], "file");
    assert_eq!(message["contextFiles"][0]["uri"]["path"], "Cargo.toml");
}

#[tokio::test]
async fn test_unauthenticated_agent_tears_down_session() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, |request| {
        if request["method"] == "initialize" {
            vec![result_for(request, json!({"authenticated": false}))]
        } else {
            Vec::new()
        }
    });

    let err = session.initialize(json!({"name": "tests"})).await.unwrap_err();
    assert!(matches!(err, CodyError::Unauthenticated));
    assert!(session.is_closed());

    let err = session.new_chat().await.unwrap_err();
    assert!(matches!(err, CodyError::ConnectionClosed));

    // The agent sees the shutdown and then EOF
    let requests = agent_task.await.unwrap();
    assert_eq!(methods(&requests), vec!["initialize", "shutdown"]);
}

#[tokio::test]
async fn test_repo_lookup_is_cached() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, agent_responses);

    let repos = session
        .lookup_repo_ids(&names(&["github.com/a", "missing", "github.com/b"]))
        .await
        .unwrap();
    assert_eq!(
        repos,
        vec![
            json!({"name": "github.com/a", "id": "id-github.com/a"}),
            json!({"name": "github.com/b", "id": "id-github.com/b"}),
        ]
    );

    // Fully cached, including the name the agent did not know
    let again = session
        .lookup_repo_ids(&names(&["github.com/b", "missing", "github.com/a"]))
        .await
        .unwrap();
    assert_eq!(again, repos);
    assert_eq!(session.repo_cache().len(), 3);

    session.shutdown().await.unwrap();
    let requests = agent_task.await.unwrap();

    assert_eq!(methods(&requests), vec!["graphql/getRepoIds", "shutdown"]);
    assert_eq!(
        requests[0]["params"],
        json!({"names": ["github.com/a", "missing", "github.com/b"], "first": 3})
    );
}

#[tokio::test]
async fn test_repo_lookup_only_requests_new_names() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, agent_responses);

    session.lookup_repo_ids(&names(&["a"])).await.unwrap();
    let repos = session.lookup_repo_ids(&names(&["a", "b"])).await.unwrap();
    assert_eq!(repos.len(), 2);

    session.shutdown().await.unwrap();
    let requests = agent_task.await.unwrap();

    assert_eq!(requests[1]["params"], json!({"names": ["b"], "first": 1}));
}

#[tokio::test]
async fn test_repo_lookup_without_repos_caches_nothing() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, |request| {
        if request["method"] == "graphql/getRepoIds" {
            vec![result_for(request, json!({"error": "unavailable"}))]
        } else {
            Vec::new()
        }
    });

    let err = session.lookup_repo_ids(&names(&["a"])).await.unwrap_err();
    assert!(matches!(err, CodyError::NoResult { .. }));
    assert!(session.repo_cache().is_empty());

    session.shutdown().await.unwrap();
    agent_task.await.unwrap();
}

#[tokio::test]
async fn test_set_context_repos_skips_unchanged() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, agent_responses);

    session.new_chat().await.unwrap();
    session.set_context_repos(&names(&["a", "missing"])).await.unwrap();
    session.set_context_repos(&names(&["a", "missing"])).await.unwrap();
    assert_eq!(session.repo_context(), &names(&["a", "missing"])[..]);

    session.shutdown().await.unwrap();
    let requests = agent_task.await.unwrap();

    assert_eq!(
        methods(&requests),
        vec![
            "chat/new",
            "graphql/getRepoIds",
            "webview/receiveMessage",
            "shutdown"
        ]
    );
    assert_eq!(
        requests[2]["params"],
        json!({
            "id": "chat-42",
            "message": {
                "command": "context/choose-remote-search-repo",
                "explicitRepos": [{"name": "a", "id": "id-a"}]
            }
        })
    );
}

#[tokio::test]
async fn test_models() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, agent_responses);

    session.new_chat().await.unwrap();
    let models = session.get_models("chat").await.unwrap().unwrap();
    assert_eq!(models["models"][0]["model"], "anthropic/claude-3-sonnet");
    session.set_model("anthropic/claude-3-sonnet").await.unwrap();

    session.shutdown().await.unwrap();
    let requests = agent_task.await.unwrap();

    assert_eq!(requests[1]["params"], json!({"modelUsage": "chat"}));
    assert_eq!(
        requests[2]["params"],
        json!({
            "id": "chat-42",
            "message": {"command": "chatModel", "model": "anthropic/claude-3-sonnet"}
        })
    );
}

#[tokio::test]
async fn test_quit_commands_send_nothing() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, agent_responses);

    for command in ["/quit", "/bye", "/exit"] {
        let reply = session.chat(command, &ChatOptions::default()).await.unwrap();
        assert_eq!(reply, Some(ChatReply::default()));
    }

    session.shutdown().await.unwrap();
    let requests = agent_task.await.unwrap();

    assert_eq!(methods(&requests), vec!["shutdown"]);
    assert_eq!(requests[0]["id"], 1);
}

#[tokio::test]
async fn test_empty_transcript_is_no_reply() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, |request| {
        if request["method"] == "shutdown" {
            return Vec::new();
        }
        vec![result_for(request, json!({"type": "transcript", "messages": []}))]
    });

    let reply = session.chat("Hello", &ChatOptions::default()).await.unwrap();
    assert_eq!(reply, None);

    session.shutdown().await.unwrap();
    assert_eq!(methods(&agent_task.await.unwrap()), vec!["chat/submitMessage", "shutdown"]);
}

#[tokio::test]
async fn test_agent_replying_after_shutdown_is_harmless() {
    let (session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, |request| vec![result_for(request, Value::Null)]);

    session.shutdown().await.unwrap();

    // The reply to `shutdown` has nowhere to go once the session is dropped
    assert_eq!(methods(&agent_task.await.unwrap()), vec!["shutdown"]);
}

#[tokio::test]
async fn test_malformed_context_history_keeps_reply() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, |request| {
        if request["method"] != "chat/submitMessage" {
            return Vec::new();
        }
        vec![result_for(
            request,
            json!({
                "type": "transcript",
                "messages": [
                    {
                        "speaker": "human",
                        "text": "hi",
                        "contextFiles": [
                            {"uri": {"path": "/a.py"}, "range": {"start": {"line": 1}}},
                            {"type": "repository", "repoName": "x"}
                        ]
                    },
                    {"speaker": "assistant", "text": "hello"}
                ]
            }),
        )]
    });

    let reply = session.chat("hi", &ChatOptions::default()).await.unwrap();
    assert_eq!(
        reply,
        Some(ChatReply {
            text: "hello".to_string(),
            context_files: Vec::new(),
        })
    );

    session.shutdown().await.unwrap();
    agent_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silent_agent_times_out() {
    let (mut session, mut agent) = connect(ClientBuilder::new().read_timeout(Duration::from_secs(2)));

    let reply = session.chat("Hello", &ChatOptions::default()).await.unwrap();
    assert_eq!(reply, None);

    let err = session.new_chat().await.unwrap_err();
    assert!(matches!(err, CodyError::NoResult { .. }));

    // Both requests still reached the agent
    let mut buffer = FrameBuffer::new();
    let first = recv(&mut agent, &mut buffer).await.unwrap();
    let second = recv(&mut agent, &mut buffer).await.unwrap();
    assert_eq!(first["method"], "chat/submitMessage");
    assert_eq!(second["id"], 2);
}

#[tokio::test]
async fn test_closed_session_rejects_operations() {
    let (mut session, agent) = connect(ClientBuilder::new());
    let agent_task = spawn_agent(agent, |request| {
        if request["method"] == "shutdown" {
            return Vec::new();
        }
        vec![result_for(request, json!({"authenticated": false}))]
    });

    assert!(session.initialize(json!({})).await.is_err());

    // Unchanged (empty) repo context still reports the closed session
    assert!(matches!(
        session.set_context_repos(&[]).await,
        Err(CodyError::ConnectionClosed)
    ));

    assert!(matches!(
        session.chat("Hello", &ChatOptions::default()).await,
        Err(CodyError::ConnectionClosed)
    ));
    assert!(matches!(
        session.lookup_repo_ids(&names(&["a"])).await,
        Err(CodyError::ConnectionClosed)
    ));
    assert!(matches!(
        session.get_models("chat").await,
        Err(CodyError::ConnectionClosed)
    ));
    assert!(matches!(session.shutdown().await, Err(CodyError::ConnectionClosed)));

    agent_task.await.unwrap();
}
