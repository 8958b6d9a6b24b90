//! Roster
//!
//! The set of agents (and optional team) a backend serves, declared once at
//! startup either in code or from a JSON file.

use crate::{
    agent::{Agent, AgentDescriptor},
    conversation::Turn,
    llm_client::LLMClient,
    team::{RunOutput, Team, TeamDescriptor, TeamMode},
    tools::{
        info::{KNOWN_TOOLS, SEARCH_PAPERS, STOCK_QUOTE, TOP_NEWS, WEB_SEARCH},
        lookup::LookupClient,
    },
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, sync::Arc};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RosterError {
    #[error("Roster declares no agents")]
    Empty,
    #[error("Agent and team names must not be empty")]
    EmptyName,
    #[error("Duplicate agent name: {0}")]
    DuplicateName(String),
    #[error("Agent '{agent}' references unknown tool '{tool}'")]
    UnknownTool { agent: String, tool: String },
    #[error("Team '{team}' references unknown member '{member}'")]
    UnknownMember { team: String, member: String },
    #[error("Team '{0}' has no members")]
    EmptyTeam(String),
}

/// Team declaration as written in a roster file: members are referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSpec {
    pub name: String,
    pub mode: TeamMode,
    pub model: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    pub agents: Vec<AgentDescriptor>,
    #[serde(default)]
    pub team: Option<TeamSpec>,
}

impl Roster {
    /// The built-in research roster: four lookup specialists coordinated by a team.
    pub fn research(model: &str) -> Self {
        let agents = vec![
            AgentDescriptor::new(
                "Web Researcher",
                "Searches the web for current information",
                model,
            )
            .with_tools(&[WEB_SEARCH])
            .with_instructions(&["Always include sources"]),
            AgentDescriptor::new(
                "Paper Researcher",
                "Finds and summarises academic papers",
                model,
            )
            .with_tools(&[SEARCH_PAPERS])
            .with_instructions(&["List the authors and year of every paper you cite"]),
            AgentDescriptor::new("News Reporter", "Reports on trending technology news", model)
                .with_tools(&[TOP_NEWS])
                .with_instructions(&["Include a link to every story you mention"]),
            AgentDescriptor::new(
                "Finance Analyst",
                "Looks up stock prices and market data",
                model,
            )
            .with_tools(&[STOCK_QUOTE])
            .with_instructions(&["Use tables to display data"]),
        ];
        let members = agents.iter().map(|a| a.name.clone()).collect();

        Self {
            agents,
            team: Some(TeamSpec {
                name: "Research Team".to_string(),
                mode: TeamMode::Coordinate,
                model: model.to_string(),
                members,
                instructions: vec![
                    "Delegate each part of the request to the member best suited for it"
                        .to_string(),
                    "Combine the members' findings into one clear answer".to_string(),
                    "Always cite sources".to_string(),
                ],
            }),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let roster: Roster = serde_json::from_str(&text)?;
        roster.validate()?;
        Ok(roster)
    }

    pub fn validate(&self) -> Result<(), RosterError> {
        if self.agents.is_empty() {
            return Err(RosterError::Empty);
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(RosterError::EmptyName);
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(RosterError::DuplicateName(agent.name.clone()));
            }
            if let Some(tool) = agent.tools.iter().find(|t| !KNOWN_TOOLS.contains(&t.as_str())) {
                return Err(RosterError::UnknownTool {
                    agent: agent.name.clone(),
                    tool: tool.clone(),
                });
            }
        }
        if let Some(team) = &self.team {
            if team.name.trim().is_empty() {
                return Err(RosterError::EmptyName);
            }
            if team.members.is_empty() {
                return Err(RosterError::EmptyTeam(team.name.clone()));
            }
            if let Some(member) = team.members.iter().find(|m| !seen.contains(m.as_str())) {
                return Err(RosterError::UnknownMember {
                    team: team.name.clone(),
                    member: member.clone(),
                });
            }
        }
        Ok(())
    }

    /// Resolves the team declaration into a descriptor carrying its members.
    pub fn team_descriptor(&self) -> Result<Option<TeamDescriptor>, RosterError> {
        let Some(team) = &self.team else {
            return Ok(None);
        };
        let members = team
            .members
            .iter()
            .map(|name| {
                self.agents
                    .iter()
                    .find(|a| &a.name == name)
                    .cloned()
                    .ok_or_else(|| RosterError::UnknownMember {
                        team: team.name.clone(),
                        member: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(TeamDescriptor {
            name: team.name.clone(),
            mode: team.mode,
            model: team.model.clone(),
            members,
            instructions: team.instructions.clone(),
            markdown: true,
        }))
    }

    /// Builds what answers chat requests: the team when one is declared,
    /// otherwise the first agent.
    pub fn into_runner(self, lookup: LookupClient) -> Result<Runner, RosterError> {
        self.validate()?;
        match self.team_descriptor()? {
            Some(team) => Ok(Runner::Team(Team::new(team, lookup))),
            None => {
                let agent = self.agents.into_iter().next().ok_or(RosterError::Empty)?;
                Ok(Runner::Agent(Agent::new(agent, lookup)))
            }
        }
    }
}

/// The entry point for chat requests.
pub enum Runner {
    Agent(Agent),
    Team(Team),
}

impl Runner {
    pub fn name(&self) -> &str {
        match self {
            Runner::Agent(agent) => &agent.descriptor().name,
            Runner::Team(team) => &team.descriptor().name,
        }
    }

    /// Answers one message. A single agent reports no contributing members.
    pub async fn run(
        &self,
        llm: Arc<dyn LLMClient>,
        history: &[Turn],
        message: &str,
    ) -> Result<RunOutput> {
        match self {
            Runner::Agent(agent) => {
                let run = agent.run(llm.as_ref(), history, message).await?;
                Ok(RunOutput {
                    content: run.content,
                    agents_used: Vec::new(),
                })
            }
            Runner::Team(team) => team.run(llm, history, message).await,
        }
    }
}
