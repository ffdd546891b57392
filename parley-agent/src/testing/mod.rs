// ABOUTME: Test doubles shared by parley crates - a scripted model and a recording backend wrapper.
// ABOUTME: Nothing here touches the network or spawns processes.

pub mod recording;

pub use recording::{RecordingBackend, Transcript};

use crate::model::{ModelClient, ModelRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Scripted {
    Reply(String),
    Fail(String),
}

/// ModelClient that answers from a queue and remembers every request.
///
/// When the queue runs dry each call fails, so a test that makes more model
/// calls than it scripted sees an error rather than a made-up reply.
pub struct ScriptedModel {
    queue: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply
    pub fn reply(self, text: &str) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted::Reply(text.to_string()));
        self
    }

    /// Queue a failure
    pub fn fail(self, reason: &str) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted::Fail(reason.to_string()));
        self
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        let next = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(reason)) => anyhow::bail!(reason),
            None => anyhow::bail!("ScriptedModel has no reply queued"),
        }
    }
}
