//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the database handle and service clients.

use crate::config::Config;
use teamchat_core::{Roster, Runner, llm_client::LLMClient, voice::SpeechService};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<crate::db::Db>,
    pub runner: Arc<Runner>,
    pub roster: Arc<Roster>,
    pub llm_client: Arc<dyn LLMClient>,
    /// `None` when no speech provider is configured.
    pub speech: Option<Arc<dyn SpeechService>>,
    pub config: Arc<Config>,
}
