// ABOUTME: LLM persona backend - an agent with instructions and its own conversation history.
// ABOUTME: Each batch becomes one user turn; the model's answer becomes the agent's chat message.

use crate::event::{AgentEvent, ErrorCode};
use crate::handle::AgentHandle;
use crate::model::{ChatTurn, ModelClient, ModelRequest};
use crate::record::{format_batch, MessageRecord};
use crate::registry::{BackendContext, BackendFactory};
use crate::traits::AgentBackend;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

/// Per-agent knobs read from the agent's backend table
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_history() -> usize {
    40
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: None,
            model: None,
            max_history: default_max_history(),
        }
    }
}

pub struct LlmBackend {
    system: String,
    client: Arc<dyn ModelClient>,
    config: LlmConfig,
    history: Vec<ChatTurn>,
}

impl LlmBackend {
    pub fn new(
        agent_name: &str,
        instructions: &str,
        client: Arc<dyn ModelClient>,
        config: LlmConfig,
    ) -> Self {
        Self {
            system: system_prompt(agent_name, instructions),
            client,
            config,
            history: Vec::new(),
        }
    }

    pub fn into_handle(self) -> AgentHandle {
        AgentHandle::spawn(self)
    }

    /// Factory function for the registry. Needs a model client in the context.
    pub fn factory() -> BackendFactory {
        Box::new(|ctx: &BackendContext<'_>| {
            let client = ctx
                .model
                .clone()
                .with_context(|| format!("Agent {} needs a model client", ctx.agent_name))?;
            let config: LlmConfig = serde_json::from_value(ctx.config.clone())
                .with_context(|| format!("Invalid llm backend config for {}", ctx.agent_name))?;
            Ok(LlmBackend::new(ctx.agent_name, ctx.instructions, client, config).into_handle())
        })
    }

    fn trim_history(&mut self) {
        let max = self.config.max_history;
        if self.history.len() > max {
            let excess = self.history.len() - max;
            self.history.drain(..excess);
        }
    }
}

fn system_prompt(agent_name: &str, instructions: &str) -> String {
    format!(
        "{instructions}\n\n\
         You are {agent_name}, a member of a group chat. Messages arrive as \
         `sender: text` lines. Mention someone with @name to send them your reply; \
         use @human to talk to the person running the chat."
    )
}

impl AgentBackend for LlmBackend {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn respond<'a>(
        &'a mut self,
        agent_id: &'a str,
        records: &'a [MessageRecord],
    ) -> BoxFuture<'a, Result<BoxStream<'a, AgentEvent>>> {
        Box::pin(async move {
            let user = format_batch(records);
            let request = ModelRequest::new(self.system.clone(), user.clone())
                .with_history(self.history.clone())
                .with_model(self.config.model.clone());
            let request = match self.config.temperature {
                Some(t) => request.with_temperature(t),
                None => request,
            };

            let event = match self.client.complete(&request).await {
                Ok(reply) => {
                    self.history.push(ChatTurn::user(user));
                    self.history.push(ChatTurn::assistant(reply.clone()));
                    self.trim_history();
                    AgentEvent::Result {
                        text: reply,
                        usage: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(agent = %agent_id, error = %e, "Model call failed");
                    AgentEvent::Error {
                        code: ErrorCode::BackendError,
                        message: e.to_string(),
                        recoverable: true,
                    }
                }
            };

            Ok(stream::once(async move { event }).boxed())
        })
    }
}
