//! Main Entrypoint for the Teamchat API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Opening the database and running migrations.
//! 3. Loading the roster and initializing the model and speech clients.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{net::SocketAddr, sync::Arc};
use teamchat_api::{config::Config, db::Db, router::create_router, state::AppState};
use teamchat_core::{
    Roster,
    llm_client::{LLMClient, OpenAICompatibleClient},
    tools::lookup::LookupClient,
    voice::{OpenAISpeechService, SpeechService},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal. Shutting down gracefully..."),
        Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
    }
}

fn load_roster(config: &Config) -> anyhow::Result<Roster> {
    match &config.roster_path {
        Some(path) => Roster::from_json_file(path)
            .with_context(|| format!("Failed to load roster from {}", path.display())),
        None => Ok(Roster::research(&config.chat_model)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let db = Db::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    db.run_migrations().await?;
    let db = Arc::new(db);
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Initialize Shared Services ---
    let roster = load_roster(&config)?;
    let runner = roster.clone().into_runner(LookupClient::new())?;
    info!(
        runner = %runner.name(),
        agents = roster.agents.len(),
        "Roster loaded."
    );

    let api_key = config
        .provider_api_key()
        .context("The selected provider has no API key")?;
    let llm_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.provider.api_base());
    let llm_client: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(llm_config));

    let speech: Option<Arc<dyn SpeechService>> = match &config.openai_api_key {
        Some(key) => {
            let speech_config = OpenAIConfig::new().with_api_key(key);
            Some(Arc::new(OpenAISpeechService::new(speech_config)))
        }
        None => {
            warn!("OPENAI_API_KEY is not set. Voice endpoints are disabled.");
            None
        }
    };

    let app_state = Arc::new(AppState {
        db,
        runner: Arc::new(runner),
        roster: Arc::new(roster),
        llm_client,
        speech,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
