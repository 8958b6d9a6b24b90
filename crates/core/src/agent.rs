//! Agents
//!
//! An agent binds a model, a role, optional instructions and an optional set of
//! lookup tools. Descriptors are plain data built once at startup; [`Agent`]
//! pairs a descriptor with the runtime resources needed to answer a message.

use crate::{
    conversation::{Turn, build_messages},
    llm_client::{LLMAction, LLMClient, collect_stream},
    tools::{ToolSession, info::InfoTools, lookup::LookupClient},
};
use anyhow::{Result, bail};
use async_openai::types::ChatCompletionRequestMessage;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

fn default_markdown() -> bool {
    true
}

/// Declarative description of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    /// A short description of what the agent is for, shown to the model and to
    /// team leaders choosing whom to delegate to.
    pub role: String,
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default = "default_markdown")]
    pub markdown: bool,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, role: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            model: model.into(),
            tools: Vec::new(),
            instructions: Vec::new(),
            markdown: true,
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_instructions(mut self, instructions: &[&str]) -> Self {
        self.instructions = instructions.iter().map(|i| i.to_string()).collect();
        self
    }

    /// Renders the system prompt sent at the start of every run.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}. Your role: {}", self.name, self.role);
        append_instructions(&mut prompt, &self.instructions, self.markdown);
        prompt
    }
}

pub(crate) fn append_instructions(prompt: &mut String, instructions: &[String], markdown: bool) {
    if !instructions.is_empty() {
        prompt.push_str("\n\n## Instructions\n");
        for instruction in instructions {
            prompt.push_str("- ");
            prompt.push_str(instruction);
            prompt.push('\n');
        }
    }
    if markdown {
        prompt.push_str("\nUse markdown to format your answers.");
    }
}

/// The outcome of one agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRun {
    pub content: String,
    /// Names of the tools called during the run, in call order.
    pub tool_calls: Vec<String>,
}

pub struct Agent {
    descriptor: AgentDescriptor,
    lookup: LookupClient,
}

impl Agent {
    pub fn new(descriptor: AgentDescriptor, lookup: LookupClient) -> Self {
        Self { descriptor, lookup }
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    /// Answers `message` given the prior `history`.
    ///
    /// If the model asks for tools they are executed once and the model is then
    /// asked for its final answer; a run never performs more than one tool round.
    #[instrument(name = "agent_run", skip_all, fields(agent = %self.descriptor.name))]
    pub async fn run(&self, llm: &dyn LLMClient, history: &[Turn], message: &str) -> Result<AgentRun> {
        let messages = build_messages(&self.descriptor.system_prompt(), history, message)?;

        let run = if self.descriptor.tools.is_empty() {
            respond(llm, &self.descriptor.model, messages, None).await?
        } else {
            let session = ToolSession::start(
                InfoTools::new(self.lookup.clone()),
                Some(self.descriptor.tools.clone()),
            )
            .await?;
            respond(llm, &self.descriptor.model, messages, Some(&session)).await?
        };

        if run.content.trim().is_empty() {
            bail!(AgentError::EmptyResponse(self.descriptor.name.clone()));
        }
        info!(tool_calls = ?run.tool_calls, "Agent run finished");
        Ok(run)
    }
}

/// Failures specific to agent and team runs.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent '{0}' returned an empty response")]
    EmptyResponse(String),
    #[error("The model requested tools but none are available")]
    NoToolsAvailable,
    #[error("No member of team '{0}' produced a response")]
    NoMemberResponded(String),
}

/// One decide → (tools → answer) round against the model.
pub(crate) async fn respond(
    llm: &dyn LLMClient,
    model: &str,
    mut messages: Vec<ChatCompletionRequestMessage>,
    tools: Option<&ToolSession>,
) -> Result<AgentRun> {
    let definitions = match tools {
        Some(session) => session.definitions().await?,
        None => Vec::new(),
    };

    let action = llm
        .decide_action(model.to_string(), messages.clone(), definitions)
        .await?;

    match action {
        LLMAction::TextResponse(content) => Ok(AgentRun {
            content,
            tool_calls: Vec::new(),
        }),
        LLMAction::ToolCall(tool_calls) => {
            let Some(session) = tools else {
                bail!(AgentError::NoToolsAvailable);
            };
            let called = session.execute(&mut messages, tool_calls).await?;
            let stream = llm.stream_after_tools(model.to_string(), messages).await?;
            Ok(AgentRun {
                content: collect_stream(stream).await?,
                tool_calls: called,
            })
        }
    }
}

/// Asks the model for plain text, with no tools on offer.
pub(crate) async fn complete(
    llm: &dyn LLMClient,
    model: &str,
    messages: Vec<ChatCompletionRequestMessage>,
) -> Result<String> {
    Ok(respond(llm, model, messages, None).await?.content)
}
