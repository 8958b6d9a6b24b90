//! Tool plumbing shared by agents and teams.
//!
//! Tool servers implement `rmcp::ServerHandler` and are served in-process over a
//! `tokio::io::duplex` pipe for the duration of one run. The model sees them as
//! ordinary chat-completion function tools.

pub mod info;
pub mod lookup;

use anyhow::{Result, anyhow};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestToolMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
    FunctionObjectArgs,
};
use rmcp::{
    ServerHandler, ServiceExt,
    model::{CallToolRequestParam, JsonObject, RawContent},
    service::{RoleClient, RunningService},
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::llm_client::ToolCall;

/// A running tool server plus the MCP client connected to it.
///
/// The server task is aborted when the session is dropped.
pub struct ToolSession {
    client: RunningService<RoleClient, ()>,
    server: JoinHandle<()>,
    allowed: Option<Vec<String>>,
}

impl ToolSession {
    /// Spawns `service` and connects a client to it.
    ///
    /// With `allowed` set, only the named tools are advertised and callable.
    pub async fn start<S>(service: S, allowed: Option<Vec<String>>) -> Result<Self>
    where
        S: ServerHandler,
    {
        let (server_transport, client_transport) = tokio::io::duplex(4096);

        let server = tokio::spawn(async move {
            match service.serve(server_transport).await {
                Ok(running) => {
                    let _ = running.waiting().await;
                }
                Err(e) => warn!(error = %e, "Tool server failed to start"),
            }
        });
        let client = ().serve(client_transport).await?;

        Ok(Self {
            client,
            server,
            allowed,
        })
    }

    fn is_allowed(&self, name: &str) -> bool {
        self.allowed
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|a| a == name))
    }

    /// Lists the advertised tools as chat-completion function definitions.
    pub async fn definitions(&self) -> Result<Vec<ChatCompletionTool>> {
        self.client
            .list_all_tools()
            .await?
            .into_iter()
            .filter(|t| self.is_allowed(&t.name))
            .map(|t| {
                Ok(ChatCompletionToolArgs::default()
                    .function(
                        FunctionObjectArgs::default()
                            .name(t.name)
                            .description(t.description.unwrap_or_default())
                            .parameters(serde_json::to_value(&*t.input_schema)?)
                            .build()?,
                    )
                    .build()?)
            })
            .collect()
    }

    /// Calls a tool and returns its text output.
    ///
    /// Failures are returned as text too, so the model can see what went wrong
    /// and answer accordingly.
    pub async fn call(&self, name: &str, arguments: &str) -> String {
        match self.try_call(name, arguments).await {
            Ok(text) => text,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call failed");
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        }
    }

    async fn try_call(&self, name: &str, arguments: &str) -> Result<String> {
        if !self.is_allowed(name) {
            return Err(anyhow!("Tool '{name}' is not available to this agent"));
        }
        let arguments = if arguments.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str::<JsonObject>(arguments)?)
        };
        debug!(tool = %name, "Calling tool");

        let result = self
            .client
            .peer()
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await?;

        let text = result
            .content
            .unwrap_or_default()
            .into_iter()
            .filter_map(|content| match content.raw {
                RawContent::Text(text_content) => Some(text_content.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error == Some(true) {
            return Err(anyhow!(text));
        }
        Ok(text)
    }

    /// Runs every requested tool call, appending the assistant tool-call message
    /// and one tool message per result to `messages`.
    ///
    /// Returns the names of the tools that were called, in order.
    pub async fn execute(
        &self,
        messages: &mut Vec<ChatCompletionRequestMessage>,
        tool_calls: Vec<ToolCall>,
    ) -> Result<Vec<String>> {
        messages.push(
            ChatCompletionRequestAssistantMessageArgs::default()
                .tool_calls(tool_calls.clone())
                .build()?
                .into(),
        );

        let mut called = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let result = self.call(&call.function.name, &call.function.arguments).await;
            messages.push(
                ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(call.id)
                    .content(result)
                    .build()?
                    .into(),
            );
            called.push(call.function.name);
        }
        Ok(called)
    }
}

impl Drop for ToolSession {
    fn drop(&mut self) {
        self.server.abort();
    }
}
