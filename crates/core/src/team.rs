//! Teams
//!
//! A team is a leader model plus a set of member agents. In `route` and
//! `coordinate` mode the leader is given a `delegate_task_to_member` tool and
//! decides whom to involve; in `collaborate` mode every member answers and the
//! leader merges the answers.

use crate::{
    agent::{Agent, AgentDescriptor, AgentError, append_instructions, complete, respond},
    conversation::{Turn, build_messages},
    llm_client::{LLMAction, LLMClient, collect_stream},
    tools::{ToolSession, lookup::LookupClient},
};
use anyhow::{Result, bail};
use async_openai::types::ChatCompletionRequestMessage;
use futures::future::join_all;
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

pub const DELEGATE_TOOL: &str = "delegate_task_to_member";

/// How a team splits work between its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamMode {
    /// The leader hands the request to a single member and returns that answer as-is.
    Route,
    /// The leader delegates tasks to members and writes the final answer.
    Coordinate,
    /// Every member answers; the leader merges the answers.
    Collaborate,
}

/// Declarative description of a team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDescriptor {
    pub name: String,
    pub mode: TeamMode,
    /// Model used by the team leader.
    pub model: String,
    pub members: Vec<AgentDescriptor>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default = "default_markdown")]
    pub markdown: bool,
}

fn default_markdown() -> bool {
    true
}

impl TeamDescriptor {
    /// Renders the leader's system prompt: member roster, mode guidance, then
    /// the team's own instructions.
    pub fn leader_prompt(&self) -> String {
        let mut prompt = format!(
            "You are the leader of the team \"{}\".\n\n## Team members\n",
            self.name
        );
        for member in &self.members {
            prompt.push_str(&format!("- {}: {}\n", member.name, member.role));
        }
        prompt.push('\n');
        prompt.push_str(match self.mode {
            TeamMode::Route => {
                "Choose the single member best suited to the request and hand it to them with the \
                 `delegate_task_to_member` tool. Their answer is sent to the user unchanged. \
                 Only answer yourself if no member fits."
            }
            TeamMode::Coordinate => {
                "Split the request into tasks and delegate each one to the best suited member with \
                 the `delegate_task_to_member` tool. Then combine the members' results into a \
                 single answer for the user."
            }
            TeamMode::Collaborate => {
                "Every member has already answered the request. Merge their answers into a single \
                 answer for the user, resolving any disagreements."
            }
        });
        append_instructions(&mut prompt, &self.instructions, self.markdown);
        prompt
    }
}

/// A member's contribution to a team run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContribution {
    pub name: String,
    pub role: String,
    pub content: String,
}

impl AgentContribution {
    fn from_member(descriptor: &AgentDescriptor, content: String) -> Self {
        Self {
            name: descriptor.name.clone(),
            role: descriptor.role.clone(),
            content,
        }
    }
}

/// The outcome of a chat run, whether answered by a single agent or a team.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub content: String,
    pub agents_used: Vec<AgentContribution>,
}

pub struct Team {
    descriptor: TeamDescriptor,
    members: Arc<Vec<Agent>>,
}

impl Team {
    pub fn new(descriptor: TeamDescriptor, lookup: LookupClient) -> Self {
        let members = descriptor
            .members
            .iter()
            .cloned()
            .map(|member| Agent::new(member, lookup.clone()))
            .collect();
        Self {
            descriptor,
            members: Arc::new(members),
        }
    }

    pub fn descriptor(&self) -> &TeamDescriptor {
        &self.descriptor
    }

    #[instrument(name = "team_run", skip_all, fields(team = %self.descriptor.name, mode = ?self.descriptor.mode))]
    pub async fn run(
        &self,
        llm: Arc<dyn LLMClient>,
        history: &[Turn],
        message: &str,
    ) -> Result<RunOutput> {
        let output = match self.descriptor.mode {
            TeamMode::Route | TeamMode::Coordinate => self.delegate(llm, history, message).await?,
            TeamMode::Collaborate => self.collaborate(llm.as_ref(), history, message).await?,
        };

        if output.content.trim().is_empty() {
            bail!(AgentError::EmptyResponse(self.descriptor.name.clone()));
        }
        info!(members = output.agents_used.len(), "Team run finished");
        Ok(output)
    }

    async fn delegate(
        &self,
        llm: Arc<dyn LLMClient>,
        history: &[Turn],
        message: &str,
    ) -> Result<RunOutput> {
        let contributions = Arc::new(Mutex::new(Vec::new()));
        let session = ToolSession::start(
            TeamTools::new(self.members.clone(), llm.clone(), contributions.clone()),
            None,
        )
        .await?;
        let messages = build_messages(&self.descriptor.leader_prompt(), history, message)?;

        let content = match self.descriptor.mode {
            TeamMode::Route => {
                self.route(llm.as_ref(), messages, &session, &contributions)
                    .await?
            }
            _ => {
                respond(llm.as_ref(), &self.descriptor.model, messages, Some(&session))
                    .await?
                    .content
            }
        };
        drop(session);

        let agents_used = contributions.lock().await.clone();
        Ok(RunOutput {
            content,
            agents_used,
        })
    }

    /// Lets the leader pick a member and passes that member's answer through.
    ///
    /// If every delegation failed the leader answers from the tool errors.
    async fn route(
        &self,
        llm: &dyn LLMClient,
        mut messages: Vec<ChatCompletionRequestMessage>,
        session: &ToolSession,
        contributions: &Mutex<Vec<AgentContribution>>,
    ) -> Result<String> {
        let model = self.descriptor.model.clone();
        let definitions = session.definitions().await?;
        match llm
            .decide_action(model.clone(), messages.clone(), definitions)
            .await?
        {
            LLMAction::TextResponse(content) => Ok(content),
            LLMAction::ToolCall(tool_calls) => {
                session.execute(&mut messages, tool_calls).await?;
                if let Some(last) = contributions.lock().await.last() {
                    return Ok(last.content.clone());
                }
                let stream = llm.stream_after_tools(model, messages).await?;
                collect_stream(stream).await
            }
        }
    }

    async fn collaborate(
        &self,
        llm: &dyn LLMClient,
        history: &[Turn],
        message: &str,
    ) -> Result<RunOutput> {
        let runs = join_all(self.members.iter().map(|member| member.run(llm, &[], message))).await;

        let mut agents_used = Vec::new();
        for (member, result) in self.members.iter().zip(runs) {
            match result {
                Ok(run) => agents_used.push(AgentContribution::from_member(
                    member.descriptor(),
                    run.content,
                )),
                Err(e) => warn!(member = %member.descriptor().name, error = %e, "Team member failed"),
            }
        }
        if agents_used.is_empty() {
            bail!(AgentError::NoMemberResponded(self.descriptor.name.clone()));
        }

        let responses = agents_used
            .iter()
            .map(|c| format!("### {} ({})\n{}", c.name, c.role, c.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let merged_request = format!("{message}\n\n---\n## Member answers\n\n{responses}");
        let messages = build_messages(&self.descriptor.leader_prompt(), history, &merged_request)?;
        let content = complete(llm, &self.descriptor.model, messages).await?;

        Ok(RunOutput {
            content,
            agents_used,
        })
    }
}

#[derive(Deserialize, Serialize, JsonSchema, Debug)]
pub struct DelegateArgs {
    #[schemars(description = "Name of the team member to delegate to")]
    pub member_name: String,
    #[schemars(description = "A clear description of the task for the member")]
    pub task: String,
    #[schemars(description = "What the member's answer should contain")]
    pub expected_output: Option<String>,
}

/// The leader's delegation tool, served over MCP for one team run.
pub struct TeamTools {
    members: Arc<Vec<Agent>>,
    llm: Arc<dyn LLMClient>,
    contributions: Arc<Mutex<Vec<AgentContribution>>>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for TeamTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl TeamTools {
    pub fn new(
        members: Arc<Vec<Agent>>,
        llm: Arc<dyn LLMClient>,
        contributions: Arc<Mutex<Vec<AgentContribution>>>,
    ) -> Self {
        Self {
            members,
            llm,
            contributions,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Delegate a task to one team member by name. Returns the member's answer."
    )]
    pub async fn delegate_task_to_member(
        &self,
        args: Parameters<DelegateArgs>,
    ) -> Result<String, String> {
        let args = args.0;
        let member = find_member(&self.members, &args.member_name).ok_or_else(|| {
            let names: Vec<&str> = self
                .members
                .iter()
                .map(|m| m.descriptor().name.as_str())
                .collect();
            format!(
                "No team member named '{}'. Available members: {}",
                args.member_name,
                names.join(", ")
            )
        })?;
        info!(member = %member.descriptor().name, "Delegating task to member");

        let task = match &args.expected_output {
            Some(expected) => format!("{}\n\nExpected output: {}", args.task, expected),
            None => args.task.clone(),
        };
        let run = member
            .run(self.llm.as_ref(), &[], &task)
            .await
            .map_err(|e| format!("Member '{}' failed: {e:#}", member.descriptor().name))?;

        self.contributions
            .lock()
            .await
            .push(AgentContribution::from_member(member.descriptor(), run.content.clone()));
        Ok(run.content)
    }
}

/// Resolves a member by name: exact (case-insensitive) match first, then a
/// fuzzy match that only one member satisfies.
pub fn find_member<'a>(members: &'a [Agent], requested: &str) -> Option<&'a Agent> {
    let requested = requested.trim();
    if let Some(member) = members
        .iter()
        .find(|m| m.descriptor().name.eq_ignore_ascii_case(requested))
    {
        return Some(member);
    }
    let matcher = SkimMatcherV2::default();
    let mut candidates = members
        .iter()
        .filter(|m| matcher.fuzzy_match(&m.descriptor().name, requested).is_some());
    match (candidates.next(), candidates.next()) {
        (Some(member), None) => Some(member),
        _ => None,
    }
}
