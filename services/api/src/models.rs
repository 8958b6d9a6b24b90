//! API and Database Models
//!
//! This module defines the core data structures used for both database mapping
//! with `sqlx` and for generating OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use std::fmt;
use teamchat_core::{AgentContribution, Role, Turn};
use utoipa::ToSchema;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl From<MessageRole> for Role {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
        }
    }
}

/// An agent that contributed to an answer.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct AgentUsed {
    #[schema(example = "Finance Analyst")]
    pub name: String,
    #[schema(example = "Looks up stock prices and market data")]
    pub role: String,
    pub content: String,
}

impl From<AgentContribution> for AgentUsed {
    fn from(contribution: AgentContribution) -> Self {
        Self {
            name: contribution.name,
            role: contribution.role,
            content: contribution.content,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    pub content: String,
    #[schema(value_type = Vec<AgentUsed>)]
    pub agents_used: Json<Vec<AgentUsed>>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for Turn {
    fn from(message: Message) -> Self {
        Turn {
            role: message.role.into(),
            content: message.content,
        }
    }
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct ChatRequest {
    #[schema(example = "What is the latest price of AAPL?")]
    pub message: String,
    /// Omit (or send `null`) to start a new session.
    #[serde(default)]
    #[schema(example = "3f2b8c1e-6a7d-4c1b-9d52-0c7e1f4b2a90")]
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: Option<String>,
    pub agents_used: Vec<AgentUsed>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TranscriptionResponse {
    pub text: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct SpeechRequest {
    pub text: String,
    /// Voice name, e.g. `alloy` or `nova`.
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_message_role_display() {
        assert_eq!(format!("{}", MessageRole::User), "user");
        assert_eq!(format!("{}", MessageRole::Assistant), "assistant");
    }

    #[test]
    fn test_chat_request_session_id_is_optional() {
        let without: ChatRequest = serde_json::from_str(r#"{"message": "Hi"}"#).unwrap();
        assert_eq!(without.session_id, None);

        let null: ChatRequest =
            serde_json::from_str(r#"{"message": "Hi", "session_id": null}"#).unwrap();
        assert_eq!(null.session_id, None);

        let with: ChatRequest =
            serde_json::from_str(r#"{"message": "Hi", "session_id": "abc"}"#).unwrap();
        assert_eq!(with.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_chat_request_missing_message() {
        let result: Result<ChatRequest, _> = serde_json::from_str(r#"{"session_id": "abc"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_chat_response_shape() {
        let response = ChatResponse {
            response: "Hello".to_string(),
            session_id: Some("abc".to_string()),
            agents_used: vec![AgentUsed {
                name: "Web Researcher".to_string(),
                role: "Searches the web".to_string(),
                content: "Found it".to_string(),
            }],
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["response"], "Hello");
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["agents_used"][0]["name"], "Web Researcher");
        assert_eq!(json["agents_used"][0]["role"], "Searches the web");
    }

    #[test]
    fn test_message_serializes_agents_used_as_plain_list() {
        let message = Message {
            id: 7,
            session_id: "abc".to_string(),
            role: MessageRole::Assistant,
            content: "Answer".to_string(),
            agents_used: Json(vec![]),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json["agents_used"].as_array().unwrap().is_empty());

        let turn: Turn = message.into();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, "Answer");
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };

        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Session not found"}"#);
    }
}
