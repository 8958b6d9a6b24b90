//! Data Access Layer
//!
//! This module contains all the functions for interacting with the SQLite database.
//! Queries are checked at runtime so the crate builds without a live database.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    types::Json,
};
use std::str::FromStr;
use tracing::debug;

use crate::models::{AgentUsed, Message, MessageRole, Session};

/// A wrapper around the `SqlitePool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL '{url}'"))?
            .create_if_missing(true);

        let in_memory = url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory {}", parent.display())
                    })?;
                }
            }
        }

        // Every connection to `:memory:` is a separate database.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Retrieves a single session by its ID.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, created_at, updated_at FROM sessions WHERE id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Stores one completed question/answer exchange atomically.
    pub async fn record_exchange(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        agents_used: &[AgentUsed],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sessions (id, created_at, updated_at)
            VALUES (?1, ?2, ?2)
            ON CONFLICT (id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (role, content, agents) in [
            (MessageRole::User, question, &[][..]),
            (MessageRole::Assistant, answer, agents_used),
        ] {
            sqlx::query(
                r#"
                INSERT INTO messages (session_id, role, content, agents_used, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(session_id)
            .bind(role)
            .bind(content)
            .bind(Json(agents))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(%session_id, "Exchange recorded");
        Ok(())
    }

    /// Retrieves the full message history for a session, ordered chronologically.
    pub async fn get_session_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, session_id, role, content, agents_used, created_at
            FROM messages
            WHERE session_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// The messages of the last `runs` exchanges, oldest first.
    pub async fn recent_messages(&self, session_id: &str, runs: usize) -> Result<Vec<Message>> {
        if runs == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(runs.saturating_mul(2)).unwrap_or(i64::MAX);
        let mut messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, session_id, role, content, agents_used, created_at
            FROM messages
            WHERE session_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }
}
