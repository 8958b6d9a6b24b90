//! Terminal client for the teamchat backend.
//!
//! [`ChatClient`] wraps the HTTP API; [`ChatSession`] holds what one terminal
//! conversation remembers between turns.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::{fmt, path::PathBuf, time::Duration};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_API_URL: &str = "http://localhost:7777";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors shown to the user. The `Display` text is what the terminal prints.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("❌ Cannot connect to backend at {0}")]
    Connection(String),
    #[error("⏱️ Request timed out")]
    Timeout,
    #[error("❌ Error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentUsed {
    pub name: String,
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub agents_used: Vec<AgentUsed>,
}

#[derive(Deserialize)]
struct Transcription {
    text: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Blocking HTTP client for the backend. At most one request is in flight.
pub struct ChatClient {
    base_url: String,
    http: Client,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Other(e.to_string()))?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one chat message within `session_id`.
    pub fn send(&self, message: &str, session_id: &str) -> Result<ChatReply, ClientError> {
        debug!(%session_id, "Sending chat message");
        let response = self
            .http
            .post(format!("{}/chat", self.base_url))
            .json(&json!({"message": message, "session_id": session_id}))
            .send()
            .map_err(|e| self.classify(e))?;
        let response = self.check(response)?;
        response.json().map_err(|e| self.classify(e))
    }

    /// Transcribes a recorded clip. `file_name` tells the backend the format.
    pub fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .query(&[("filename", file_name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .map_err(|e| self.classify(e))?;
        let transcription: Transcription = self
            .check(response)?
            .json()
            .map_err(|e| self.classify(e))?;
        Ok(transcription.text)
    }

    /// Synthesizes `text` as MP3 audio.
    pub fn speak(&self, text: &str) -> Result<Vec<u8>, ClientError> {
        let response = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .json(&json!({"text": text}))
            .send()
            .map_err(|e| self.classify(e))?;
        let bytes = self
            .check(response)?
            .bytes()
            .map_err(|e| self.classify(e))?;
        Ok(bytes.to_vec())
    }

    fn classify(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_connect() {
            ClientError::Connection(self.base_url.clone())
        } else {
            ClientError::Other(err.to_string())
        }
    }

    /// Turns a non-success status into an error carrying the backend's message.
    fn check(
        &self,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response
            .json::<ErrorBody>()
            .map(|body| body.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected response")
                    .to_string()
            });
        Err(ClientError::Other(format!("{} ({})", detail, status.as_u16())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Text,
    /// Each line names a recorded WAV file to transcribe and send.
    Voice,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Text => write!(f, "text"),
            InputMode::Voice => write!(f, "voice"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "🧑 You"),
            Speaker::Assistant => write!(f, "🤖 Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Speaker,
    pub content: String,
}

/// State of one terminal conversation.
#[derive(Debug)]
pub struct ChatSession {
    session_id: String,
    pub messages: Vec<ChatMessage>,
    pub mode: InputMode,
    pub speak_replies: bool,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            mode: InputMode::Text,
            speak_replies: false,
        }
    }

    /// Generated once and reused for every request of this conversation.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Records `text` and asks the backend for a reply.
    ///
    /// The user's message stays in the history even when the request fails.
    pub fn submit(&mut self, client: &ChatClient, text: &str) -> Result<ChatReply, ClientError> {
        self.messages.push(ChatMessage {
            role: Speaker::User,
            content: text.to_string(),
        });
        let reply = client.send(text, &self.session_id)?;
        self.messages.push(ChatMessage {
            role: Speaker::Assistant,
            content: reply.response.clone(),
        });
        Ok(reply)
    }

    /// The conversation so far, one labelled block per message.
    pub fn render_history(&self) -> String {
        if self.messages.is_empty() {
            return "(no messages yet)".to_string();
        }
        self.messages
            .iter()
            .map(|message| format!("{}:\n{}", message.role, message.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Message(String),
    Voice(PathBuf),
    Speak(bool),
    Mode(InputMode),
    History,
    Quit,
    Help,
    Invalid(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Message(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match (name, arg) {
            ("quit" | "exit", _) => Command::Quit,
            ("help", _) => Command::Help,
            ("history", _) => Command::History,
            ("voice", "") => Command::Invalid("Usage: /voice <file.wav>".to_string()),
            ("voice", path) => Command::Voice(PathBuf::from(path)),
            ("speak", "on") => Command::Speak(true),
            ("speak", "off") => Command::Speak(false),
            ("speak", _) => Command::Invalid("Usage: /speak on|off".to_string()),
            ("mode", "text") => Command::Mode(InputMode::Text),
            ("mode", "voice") => Command::Mode(InputMode::Voice),
            ("mode", _) => Command::Invalid("Usage: /mode text|voice".to_string()),
            _ => Command::Invalid(format!("Unknown command '/{name}'. Type /help")),
        }
    }
}

pub const HELP: &str = "\
Commands:
  /voice <file.wav>   transcribe a recorded file and send it
  /speak on|off       save spoken replies as mp3
  /mode text|voice    in voice mode each line is a path to a wav file
  /history            show the conversation so far
  /quit               leave the chat";
