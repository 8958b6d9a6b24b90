//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AgentUsed, ChatRequest, ChatResponse, ErrorResponse, HealthResponse, Message, MessageRole,
        Session, SpeechRequest, TranscriptionResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Upper bound for uploaded audio clips.
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::chat,
        handlers::get_session_messages,
        handlers::list_agents,
        handlers::transcribe_audio,
        handlers::synthesize_speech,
        handlers::health,
    ),
    components(
        schemas(ChatRequest, ChatResponse, AgentUsed, Session, Message, MessageRole, TranscriptionResponse, SpeechRequest, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "Teamchat API", description = "Chat with a team of lookup agents, by text or voice")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/chat", post(handlers::chat))
        .route(
            "/sessions/{id}/messages",
            get(handlers::get_session_messages),
        )
        .route("/agents", get(handlers::list_agents))
        .route(
            "/audio/transcriptions",
            post(handlers::transcribe_audio).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        .route("/audio/speech", post(handlers::synthesize_speech))
        .route("/health", get(handlers::health))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
