// ABOUTME: AgentHandle provides a Send+Sync, cloneable wrapper around a backend worker task.
// ABOUTME: Uses channels to reach the worker and exposes the observable busy flag.

use crate::{AgentBackend, AgentEvent, MessageRecord};
use anyhow::Result;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Commands sent from AgentHandle to the backend worker
#[derive(Debug)]
pub enum Command {
    Respond {
        agent_id: String,
        records: Vec<MessageRecord>,
        event_tx: mpsc::Sender<AgentEvent>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Send + Sync handle the router holds for each registered agent.
///
/// Internally communicates with a worker task that owns the backend. Clones
/// share the same worker and the same busy flag.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<Command>,
    name: &'static str,
    busy: Arc<AtomicBool>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("backend", &self.name)
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl AgentHandle {
    /// Create a new AgentHandle with the given command channel and backend name
    pub fn new(tx: mpsc::Sender<Command>, name: &'static str) -> Self {
        Self {
            tx,
            name,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Move `backend` onto its own worker task and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<B: AgentBackend>(mut backend: B) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let name = backend.name();

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Respond {
                        agent_id,
                        records,
                        event_tx,
                        reply,
                    } => match backend.respond(&agent_id, &records).await {
                        Ok(mut stream) => {
                            let _ = reply.send(Ok(()));
                            while let Some(event) = stream.next().await {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!(
                                backend = name,
                                agent = %agent_id,
                                error = %e,
                                "Backend respond failed"
                            );
                            let _ = reply.send(Err(e));
                        }
                    },
                }
            }
            tracing::debug!(backend = name, "Backend worker stopped");
        });

        Self::new(tx, name)
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True while a dispatch holds this agent's BusyGuard
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the agent for one dispatch.
    ///
    /// Returns None if another dispatch already holds it. The flag clears
    /// when the returned guard is dropped.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Send a batch of records and receive events via EventReceiver
    pub async fn respond(
        &self,
        agent_id: &str,
        records: Vec<MessageRecord>,
    ) -> Result<EventReceiver> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Command::Respond {
                agent_id: agent_id.to_string(),
                records,
                event_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker closed"))?;

        // Wait for the backend to acknowledge the batch
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker dropped reply channel"))??;

        Ok(EventReceiver::new(event_rx))
    }
}

/// Marks an agent busy for as long as it is alive.
#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Receiver for streaming events from a respond call.
///
/// This is `Send` so it can be passed across async task boundaries.
pub struct EventReceiver {
    rx: mpsc::Receiver<AgentEvent>,
}

impl EventReceiver {
    /// Create a new EventReceiver wrapping the given channel
    pub fn new(rx: mpsc::Receiver<AgentEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event, or None if the stream is closed
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Drain the stream into the agent's final reply.
    ///
    /// Accumulated text chunks win over the Result text, matching how
    /// streaming backends report. `Ok(None)` means the agent chose not to
    /// answer; an Error event becomes `Err`.
    pub async fn into_response(mut self) -> Result<Option<String>> {
        let mut full_response = String::new();

        while let Some(event) = self.recv().await {
            match event {
                AgentEvent::Text(text) => full_response.push_str(&text),
                AgentEvent::Result { text, usage } => {
                    if full_response.is_empty() {
                        full_response = text;
                    }
                    if let Some(usage) = usage {
                        tracing::debug!(
                            input_tokens = usage.input_tokens,
                            output_tokens = usage.output_tokens,
                            "Agent usage"
                        );
                    }
                    break;
                }
                AgentEvent::Error {
                    code,
                    message,
                    recoverable,
                } => {
                    anyhow::bail!(
                        "Agent error ({:?}, recoverable={}): {}",
                        code,
                        recoverable,
                        message
                    );
                }
            }
        }

        let trimmed = full_response.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }
}
