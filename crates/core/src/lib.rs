//! Core building blocks for teamchat: agent and team descriptors, the roster
//! they are declared in, the LLM client seam, lookup tools and voice I/O.

pub mod agent;
pub mod conversation;
pub mod llm_client;
pub mod roster;
pub mod team;
pub mod tools;
pub mod voice;

pub use agent::{Agent, AgentDescriptor, AgentError};
pub use conversation::{Role, Turn};
pub use roster::{Roster, Runner};
pub use team::{AgentContribution, RunOutput, Team, TeamDescriptor, TeamMode};
