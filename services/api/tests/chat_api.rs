//! End-to-end tests against a real server on an ephemeral port, backed by an
//! in-memory database and a scripted model.

use anyhow::{Result, bail};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestMessage, ChatCompletionTool,
    ChatCompletionToolType, FunctionCall,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use teamchat_api::{
    config::{Config, Provider},
    db::Db,
    router::create_router,
    state::AppState,
};
use teamchat_core::{
    AgentDescriptor, Roster,
    llm_client::{LLMAction, LLMClient, LLMStream, LLMStreamEvent},
    team::DELEGATE_TOOL,
    tools::lookup::LookupClient,
    voice::{MockSpeechService, SpeechService},
};
use tracing::Level;

/// Answers every request from a fixed script and records what it was sent.
struct ScriptedLlm {
    /// Member the team leader delegates to, if any.
    delegate_to: Option<String>,
    member_answer: String,
    final_answer: String,
    fail: bool,
    requests: Mutex<Vec<Vec<ChatCompletionRequestMessage>>>,
}

impl ScriptedLlm {
    fn answering(answer: &str) -> Self {
        Self {
            delegate_to: None,
            member_answer: "Member findings".to_string(),
            final_answer: answer.to_string(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn delegating(member: &str, member_answer: &str, final_answer: &str) -> Self {
        Self {
            delegate_to: Some(member.to_string()),
            member_answer: member_answer.to_string(),
            ..Self::answering(final_answer)
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering("unused")
        }
    }

    fn requests(&self) -> Vec<Vec<ChatCompletionRequestMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedLlm {
    async fn decide_action(
        &self,
        _model: String,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<LLMAction> {
        self.requests.lock().unwrap().push(messages);
        if self.fail {
            bail!("model is unavailable");
        }

        let offers_delegation = tools.iter().any(|t| t.function.name == DELEGATE_TOOL);
        match (&self.delegate_to, offers_delegation) {
            (Some(member), true) => Ok(LLMAction::ToolCall(vec![ChatCompletionMessageToolCall {
                id: "call_1".to_string(),
                r#type: ChatCompletionToolType::Function,
                function: FunctionCall {
                    name: DELEGATE_TOOL.to_string(),
                    arguments: json!({"member_name": member, "task": "Look it up"}).to_string(),
                },
            }])),
            (Some(_), false) => Ok(LLMAction::TextResponse(self.member_answer.clone())),
            (None, _) => Ok(LLMAction::TextResponse(self.final_answer.clone())),
        }
    }

    async fn stream_after_tools(
        &self,
        _model: String,
        _history_with_tool_results: Vec<ChatCompletionRequestMessage>,
    ) -> Result<LLMStream> {
        let chunks = vec![Ok(LLMStreamEvent::TextChunk(self.final_answer.clone()))];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

struct TestServer {
    base_url: String,
    http: reqwest::Client,
}

impl TestServer {
    async fn post_chat(&self, body: Value) -> reqwest::Response {
        self.http
            .post(format!("{}/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }
}

fn test_config(history_runs: usize) -> Config {
    Config {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url: "sqlite::memory:".to_string(),
        provider: Provider::OpenAI,
        openai_api_key: Some("test-key".to_string()),
        gemini_api_key: None,
        chat_model: "test-model".to_string(),
        log_level: Level::INFO,
        history_runs,
        roster_path: None,
    }
}

fn single_agent_roster() -> Roster {
    Roster {
        agents: vec![AgentDescriptor::new("Helper", "General assistant", "test-model")],
        team: None,
    }
}

async fn spawn_server(
    roster: Roster,
    llm: Arc<dyn LLMClient>,
    speech: Option<Arc<dyn SpeechService>>,
    history_runs: usize,
) -> TestServer {
    let config = test_config(history_runs);
    let db = Db::connect(&config.database_url).await.unwrap();
    db.run_migrations().await.unwrap();

    let runner = roster.clone().into_runner(LookupClient::new()).unwrap();
    let state = Arc::new(AppState {
        db: Arc::new(db),
        runner: Arc::new(runner),
        roster: Arc::new(roster),
        llm_client: llm,
        speech,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        http: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn chat_echoes_the_session_id() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("Hello! How can I help?")),
        None,
        5,
    )
    .await;

    let response = server
        .post_chat(json!({"message": "Hi there", "session_id": "session-123"}))
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["response"], "Hello! How can I help?");
    assert_eq!(body["session_id"], "session-123");
    assert!(body["agents_used"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn chat_assigns_a_session_id_when_absent() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("Hi")),
        None,
        5,
    )
    .await;

    for body in [json!({"message": "Hello"}), json!({"message": "Hello", "session_id": null})] {
        let response: Value = server.post_chat(body).await.json().await.unwrap();
        let session_id = response["session_id"].as_str().unwrap();
        assert!(!session_id.is_empty());
    }
}

#[tokio::test]
async fn blank_session_id_is_replaced_with_a_new_one() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("Hi")),
        None,
        5,
    )
    .await;

    let response: Value = server
        .post_chat(json!({"message": "Hello", "session_id": "  "}))
        .await
        .json()
        .await
        .unwrap();
    let session_id = response["session_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(session_id).is_ok());

    let stored = server.get(&format!("/sessions/{session_id}/messages")).await;
    assert_eq!(stored.status(), 200);
}

#[tokio::test]
async fn chat_reports_team_members_that_answered() {
    let llm = Arc::new(ScriptedLlm::delegating(
        "Finance Analyst",
        "AAPL trades at $200",
        "Apple's stock is at $200.",
    ));
    let server = spawn_server(Roster::research("test-model"), llm, None, 5).await;

    let response = server
        .post_chat(json!({"message": "What is the latest price of AAPL?", "session_id": "s1"}))
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["response"], "Apple's stock is at $200.");

    let agents_used = body["agents_used"].as_array().unwrap();
    assert_eq!(agents_used.len(), 1);
    assert_eq!(agents_used[0]["name"], "Finance Analyst");
    assert_eq!(agents_used[0]["content"], "AAPL trades at $200");
    assert!(!agents_used[0]["role"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn chat_rejects_empty_messages() {
    let llm = Arc::new(ScriptedLlm::answering("unused"));
    let server = spawn_server(single_agent_roster(), llm.clone(), None, 5).await;

    let response = server.post_chat(json!({"message": "   "})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Message must not be empty");
    assert!(llm.requests().is_empty());
}

#[tokio::test]
async fn history_is_replayed_on_the_next_turn() {
    let llm = Arc::new(ScriptedLlm::answering("Noted"));
    let server = spawn_server(single_agent_roster(), llm.clone(), None, 5).await;

    server
        .post_chat(json!({"message": "My name is Ada", "session_id": "s1"}))
        .await;
    server
        .post_chat(json!({"message": "What is my name?", "session_id": "s1"}))
        .await;

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    // system + user
    assert_eq!(requests[0].len(), 2);
    // system + previous user + previous assistant + user
    assert_eq!(requests[1].len(), 4);
    match &requests[1][1] {
        ChatCompletionRequestMessage::User(_) => {}
        other => panic!("Expected the previous user turn, got {other:?}"),
    }
    match &requests[1][2] {
        ChatCompletionRequestMessage::Assistant(_) => {}
        other => panic!("Expected the previous assistant turn, got {other:?}"),
    }
}

#[tokio::test]
async fn history_window_is_limited_to_configured_runs() {
    let llm = Arc::new(ScriptedLlm::answering("Ok"));
    let server = spawn_server(single_agent_roster(), llm.clone(), None, 1).await;

    for message in ["one", "two", "three"] {
        server
            .post_chat(json!({"message": message, "session_id": "s1"}))
            .await;
    }

    let requests = llm.requests();
    assert_eq!(requests[2].len(), 4);
}

#[tokio::test]
async fn session_messages_are_persisted() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("Hi Ada")),
        None,
        5,
    )
    .await;

    server
        .post_chat(json!({"message": "Hello, I'm Ada", "session_id": "s1"}))
        .await;

    let response = server.get("/sessions/s1/messages").await;
    assert_eq!(response.status(), 200);
    let messages: Vec<Value> = response.json().await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "Hello, I'm Ada");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Hi Ada");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("unused")),
        None,
        5,
    )
    .await;

    let response = server.get("/sessions/nope/messages").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn model_failures_are_bad_gateway_and_not_persisted() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::failing()),
        None,
        5,
    )
    .await;

    let response = server
        .post_chat(json!({"message": "Hello", "session_id": "s1"}))
        .await;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("model is unavailable"));

    assert_eq!(server.get("/sessions/s1/messages").await.status(), 404);
}

#[tokio::test]
async fn agents_lists_the_roster() {
    let server = spawn_server(
        Roster::research("test-model"),
        Arc::new(ScriptedLlm::answering("unused")),
        None,
        5,
    )
    .await;

    let body: Value = server.get("/agents").await.json().await.unwrap();
    assert_eq!(body["agents"].as_array().unwrap().len(), 4);
    assert_eq!(body["team"]["name"], "Research Team");
    assert_eq!(body["team"]["mode"], "coordinate");
}

#[tokio::test]
async fn health_reports_ok() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("unused")),
        None,
        5,
    )
    .await;

    let body: Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn transcription_uses_the_speech_service() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("unused")),
        Some(Arc::new(MockSpeechService)),
        5,
    )
    .await;

    let response = server
        .http
        .post(format!("{}/audio/transcriptions?filename=clip.wav", server.base_url))
        .body(b"RIFF....WAVEfmt ".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["text"], "Hello from a voice message");

    let empty = server
        .http
        .post(format!("{}/audio/transcriptions", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
}

#[tokio::test]
async fn speech_returns_mpeg_audio() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("unused")),
        Some(Arc::new(MockSpeechService)),
        5,
    )
    .await;

    let response = server
        .http
        .post(format!("{}/audio/speech", server.base_url))
        .json(&json!({"text": "Hello", "voice": "nova"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"Hello");

    let unknown_voice = server
        .http
        .post(format!("{}/audio/speech", server.base_url))
        .json(&json!({"text": "Hello", "voice": "robot"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_voice.status(), 400);

    let empty = server
        .http
        .post(format!("{}/audio/speech", server.base_url))
        .json(&json!({"text": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
}

#[tokio::test]
async fn voice_endpoints_are_unavailable_without_a_provider() {
    let server = spawn_server(
        single_agent_roster(),
        Arc::new(ScriptedLlm::answering("unused")),
        None,
        5,
    )
    .await;

    let response = server
        .http
        .post(format!("{}/audio/speech", server.base_url))
        .json(&json!({"text": "Hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}
