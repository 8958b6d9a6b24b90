//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling chat, history, roster and voice
//! requests. It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use teamchat_core::{Roster, Turn, voice::DEFAULT_VOICE};
use tracing::{error, info, instrument, warn};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    models::{
        AgentUsed, ChatRequest, ChatResponse, ErrorResponse, HealthResponse, Message,
        SpeechRequest, TranscriptionResponse,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    BadGateway(anyhow::Error),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse { message }),
            )
                .into_response(),
            ApiError::BadGateway(err) => {
                warn!("Upstream model failure: {:#}", err);
                let message = format!("The language model request failed: {err:#}");
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Send a message to the configured team (or agent) and get its answer.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The team's answer", body = ChatResponse),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 502, description = "The language model request failed", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(name = "chat", skip_all, fields(session_id = tracing::field::Empty))]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let session_id = match payload.session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    };
    tracing::Span::current().record("session_id", session_id.as_str());

    let history: Vec<Turn> = state
        .db
        .recent_messages(&session_id, state.config.history_runs)
        .await?
        .into_iter()
        .map(Turn::from)
        .collect();
    info!(
        runner = %state.runner.name(),
        history = history.len(),
        "Running chat request"
    );

    let output = state
        .runner
        .run(state.llm_client.clone(), &history, message)
        .await
        .map_err(ApiError::BadGateway)?;

    let agents_used: Vec<AgentUsed> = output.agents_used.into_iter().map(AgentUsed::from).collect();
    state
        .db
        .record_exchange(&session_id, message, &output.content, &agents_used)
        .await?;

    Ok(Json(ChatResponse {
        response: output.content,
        session_id: Some(session_id),
        agents_used,
    }))
}

/// Get the stored message history of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/messages",
    responses(
        (status = 200, description = "Messages in chronological order", body = [Message]),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID")
    )
)]
pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    state
        .db
        .get_session(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))?;

    let messages = state.db.get_session_messages(&id).await?;
    Ok(Json(messages))
}

/// List the agents (and team) this backend serves.
#[utoipa::path(
    get,
    path = "/agents",
    responses(
        (status = 200, description = "The declared roster: agents and the optional team")
    )
)]
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Roster> {
    Json(state.roster.as_ref().clone())
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct TranscriptionParams {
    /// File name carrying the audio container format.
    pub filename: Option<String>,
}

/// Transcribe a recorded audio clip to text.
#[utoipa::path(
    post,
    path = "/audio/transcriptions",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    params(TranscriptionParams),
    responses(
        (status = 200, description = "The transcript", body = TranscriptionResponse),
        (status = 400, description = "Empty audio", body = ErrorResponse),
        (status = 502, description = "The speech provider failed", body = ErrorResponse),
        (status = 503, description = "Voice is not configured", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn transcribe_audio(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TranscriptionParams>,
    body: Bytes,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let speech = state.speech.clone().ok_or_else(voice_unavailable)?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("Audio body must not be empty".to_string()));
    }

    let file_name = params
        .filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "recording.wav".to_string());
    let text = speech
        .transcribe(body, file_name)
        .await
        .map_err(ApiError::BadGateway)?;
    Ok(Json(TranscriptionResponse { text }))
}

/// Synthesize speech from text as MP3 audio.
#[utoipa::path(
    post,
    path = "/audio/speech",
    request_body = SpeechRequest,
    responses(
        (status = 200, description = "MP3 audio", content_type = "audio/mpeg", body = Vec<u8>),
        (status = 400, description = "Empty text or unknown voice", body = ErrorResponse),
        (status = 502, description = "The speech provider failed", body = ErrorResponse),
        (status = 503, description = "Voice is not configured", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn synthesize_speech(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SpeechRequest>,
) -> Result<Response, ApiError> {
    let speech = state.speech.clone().ok_or_else(voice_unavailable)?;
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Text must not be empty".to_string()));
    }

    let voice = payload.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string());
    teamchat_core::voice::parse_voice(&voice).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let audio = speech
        .synthesize(payload.text, voice)
        .await
        .map_err(ApiError::BadGateway)?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

fn voice_unavailable() -> ApiError {
    ApiError::ServiceUnavailable("Voice is not configured on this server".to_string())
}
