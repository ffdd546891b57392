// ABOUTME: Mock backend for testing - returns pre-configured responses.
// ABOUTME: Allows deterministic tests without network calls or child processes.
//!
//! # Example
//!
//! ```no_run
//! use parley_agent::backends::mock::MockBackend;
//!
//! # async fn example() {
//! let handle = MockBackend::new()
//!     .on_message("hello").respond_text("Hi there! @human")
//!     .on_message("explode").fail("backend crashed")
//!     .into_handle();
//! # }
//! ```

use crate::event::{AgentEvent, ErrorCode};
use crate::handle::AgentHandle;
use crate::record::{format_batch, MessageRecord};
use crate::registry::{BackendContext, BackendFactory};
use crate::traits::AgentBackend;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock backend for testing
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
}

struct Expectation {
    pattern: String,
    outcome: Outcome,
}

enum Outcome {
    Events(Vec<AgentEvent>),
    Fail(String),
}

impl MockBackend {
    /// Create a new mock backend with no expectations.
    ///
    /// Batches that match nothing produce no reply.
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            fallback: None,
            delay: None,
        }
    }

    /// Reply with `text` to every batch no expectation matches
    pub fn always(mut self, text: &str) -> Self {
        self.fallback = Some(text.to_string());
        self
    }

    /// Wait this long before answering each batch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set up an expectation for a batch whose transcript contains `pattern`
    pub fn on_message(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: pattern.to_string(),
        }
    }

    /// Convert this backend into an AgentHandle
    pub fn into_handle(self) -> AgentHandle {
        AgentHandle::spawn(self)
    }

    /// Factory function for the registry. Accepts an optional `reply` key.
    pub fn factory() -> BackendFactory {
        Box::new(|ctx: &BackendContext<'_>| {
            let mut backend = MockBackend::new();
            if let Some(reply) = ctx.config.get("reply").and_then(|v| v.as_str()) {
                backend = backend.always(reply);
            }
            Ok(backend.into_handle())
        })
    }

    // FIFO preference: check the front first, fall back to searching the
    // queue so out-of-order batches still find their expectation.
    fn take_matching(&self, transcript: &str) -> Option<Outcome> {
        let mut exp = self
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let front_matches = exp
            .front()
            .map(|e| transcript.contains(&e.pattern))
            .unwrap_or(false);
        if front_matches {
            return exp.pop_front().map(|e| e.outcome);
        }
        exp.iter()
            .position(|e| transcript.contains(&e.pattern))
            .and_then(|i| exp.remove(i))
            .map(|e| e.outcome)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn respond<'a>(
        &'a mut self,
        _agent_id: &'a str,
        records: &'a [MessageRecord],
    ) -> BoxFuture<'a, Result<BoxStream<'a, AgentEvent>>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let transcript = format_batch(records);
            let events = match self.take_matching(&transcript) {
                Some(Outcome::Events(events)) => events,
                Some(Outcome::Fail(reason)) => anyhow::bail!(reason),
                None => match self.fallback {
                    Some(ref text) => vec![AgentEvent::Result {
                        text: text.clone(),
                        usage: None,
                    }],
                    None => Vec::new(),
                },
            };

            Ok(stream::iter(events).boxed())
        })
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: String,
}

impl ExpectationBuilder {
    fn push(self, outcome: Outcome) -> MockBackend {
        self.backend
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                pattern: self.pattern,
                outcome,
            });
        self.backend
    }

    /// Respond with a list of events
    pub fn respond_with(self, events: Vec<AgentEvent>) -> MockBackend {
        self.push(Outcome::Events(events))
    }

    /// Respond with a simple text result
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.respond_with(vec![AgentEvent::Result {
            text: text.to_string(),
            usage: None,
        }])
    }

    /// Respond with an error event
    pub fn respond_error(self, code: ErrorCode, message: &str) -> MockBackend {
        self.respond_with(vec![AgentEvent::Error {
            code,
            message: message.to_string(),
            recoverable: false,
        }])
    }

    /// Fail before producing any events
    pub fn fail(self, reason: &str) -> MockBackend {
        self.push(Outcome::Fail(reason.to_string()))
    }
}
