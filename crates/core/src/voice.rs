//! Voice I/O
//!
//! Speech-to-text and text-to-speech are delegated to a hosted OpenAI-compatible
//! audio API. The trait lets the backend run without voice support (or with a
//! deterministic stand-in during tests).

use anyhow::{Context, Result, bail};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        AudioInput, CreateSpeechRequestArgs, CreateTranscriptionRequestArgs, SpeechModel,
        SpeechResponseFormat, Voice,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

pub const DEFAULT_VOICE: &str = "alloy";

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribes recorded audio. `file_name` carries the container format
    /// (e.g. `recording.wav`) the provider uses to decode the bytes.
    async fn transcribe(&self, audio: Bytes, file_name: String) -> Result<String>;

    /// Synthesizes `text` as MP3 audio spoken with `voice`.
    async fn synthesize(&self, text: String, voice: String) -> Result<Bytes>;
}

/// `SpeechService` backed by the OpenAI audio endpoints.
pub struct OpenAISpeechService {
    client: Client<OpenAIConfig>,
    transcription_model: String,
}

impl OpenAISpeechService {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
            transcription_model: "whisper-1".to_string(),
        }
    }
}

/// Parses a voice name such as `"nova"` into the provider's voice enum.
pub fn parse_voice(name: &str) -> Result<Voice> {
    serde_json::from_value(serde_json::Value::String(name.trim().to_lowercase()))
        .with_context(|| format!("Unknown voice '{name}'"))
}

#[async_trait]
impl SpeechService for OpenAISpeechService {
    async fn transcribe(&self, audio: Bytes, file_name: String) -> Result<String> {
        if audio.is_empty() {
            bail!("Audio data is empty");
        }
        debug!(bytes = audio.len(), %file_name, "Transcribing audio");

        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8(file_name, audio.to_vec()))
            .model(self.transcription_model.clone())
            .build()?;
        let response = self.client.audio().transcribe(request).await?;
        Ok(response.text.trim().to_string())
    }

    async fn synthesize(&self, text: String, voice: String) -> Result<Bytes> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(SpeechModel::Tts1)
            .voice(parse_voice(&voice)?)
            .response_format(SpeechResponseFormat::Mp3)
            .build()?;
        let response = self.client.audio().speech(request).await?;
        Ok(response.bytes)
    }
}

/// A deterministic `SpeechService` for development and integration testing.
///
/// Transcription returns a fixed phrase; synthesis echoes the text as bytes.
pub struct MockSpeechService;

#[async_trait]
impl SpeechService for MockSpeechService {
    async fn transcribe(&self, audio: Bytes, _file_name: String) -> Result<String> {
        if audio.is_empty() {
            bail!("Audio data is empty");
        }
        Ok("Hello from a voice message".to_string())
    }

    async fn synthesize(&self, text: String, voice: String) -> Result<Bytes> {
        parse_voice(&voice)?;
        Ok(Bytes::from(text.into_bytes()))
    }
}
