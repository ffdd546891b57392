// ABOUTME: Direct CLI backend - runs an external program once per batch of messages.
// ABOUTME: The transcript is passed as the last argument and trimmed stdout becomes the reply.

use crate::event::{AgentEvent, ErrorCode};
use crate::handle::AgentHandle;
use crate::record::{format_batch, MessageRecord};
use crate::registry::{BackendContext, BackendFactory};
use crate::traits::AgentBackend;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command as ProcessCommand;

/// Configuration for the Direct CLI backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectCliConfig {
    /// Program to run
    pub binary: String,
    /// Arguments placed before the transcript
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the program
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

pub struct DirectCliBackend {
    config: DirectCliConfig,
}

impl DirectCliBackend {
    pub fn new(config: DirectCliConfig) -> Result<Self> {
        if config.binary.trim().is_empty() {
            anyhow::bail!("direct backend requires a binary");
        }
        Ok(Self { config })
    }

    pub fn into_handle(self) -> AgentHandle {
        AgentHandle::spawn(self)
    }

    /// Factory function for the registry
    pub fn factory() -> BackendFactory {
        Box::new(|ctx: &BackendContext<'_>| {
            let cfg: DirectCliConfig = serde_json::from_value(ctx.config.clone())
                .with_context(|| format!("Invalid direct backend config for {}", ctx.agent_name))?;
            Ok(DirectCliBackend::new(cfg)?.into_handle())
        })
    }
}

impl AgentBackend for DirectCliBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn respond<'a>(
        &'a mut self,
        agent_id: &'a str,
        records: &'a [MessageRecord],
    ) -> BoxFuture<'a, Result<BoxStream<'a, AgentEvent>>> {
        Box::pin(async move {
            let event = match run_program(&self.config, agent_id, &format_batch(records)).await {
                Ok(text) => AgentEvent::Result { text, usage: None },
                Err(e) => {
                    tracing::warn!(agent = %agent_id, error = %e, "Direct CLI run failed");
                    AgentEvent::Error {
                        code: if e.is::<tokio::time::error::Elapsed>() {
                            ErrorCode::Timeout
                        } else {
                            ErrorCode::BackendError
                        },
                        message: e.to_string(),
                        recoverable: false,
                    }
                }
            };
            Ok(stream::once(async move { event }).boxed())
        })
    }
}

async fn run_program(config: &DirectCliConfig, agent_id: &str, transcript: &str) -> Result<String> {
    let mut cmd = ProcessCommand::new(&config.binary);
    cmd.args(&config.args)
        .arg(transcript)
        .env("PARLEY_AGENT", agent_id)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    if let Some(ref dir) = config.working_dir {
        cmd.current_dir(dir);
    }

    tracing::debug!(binary = %config.binary, args = ?config.args, "Spawning agent program");

    let output = tokio::time::timeout(Duration::from_secs(config.timeout_secs), cmd.output())
        .await?
        .with_context(|| format!("Failed to run {}", config.binary))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "{} exited with status {:?}: {}",
            config.binary,
            output.status.code(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
