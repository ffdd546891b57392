// ABOUTME: Recording wrapper for any backend - captures each batch an agent was handed.
// ABOUTME: Lets tests assert exactly which messages reached an agent, and in which order.

use crate::event::AgentEvent;
use crate::handle::AgentHandle;
use crate::record::MessageRecord;
use crate::traits::AgentBackend;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};

/// Shared, cloneable view of the batches a RecordingBackend received
#[derive(Clone, Default)]
pub struct Transcript {
    batches: Arc<Mutex<Vec<Vec<MessageRecord>>>>,
}

impl Transcript {
    /// Every batch so far, oldest first
    pub fn batches(&self) -> Vec<Vec<MessageRecord>> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Bodies of every record delivered, flattened in delivery order
    pub fn bodies(&self) -> Vec<String> {
        self.batches()
            .into_iter()
            .flatten()
            .map(|r| r.body)
            .collect()
    }

    /// Number of respond calls
    pub fn calls(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Records all batches before passing them to the wrapped backend
pub struct RecordingBackend<B> {
    inner: B,
    transcript: Transcript,
}

impl<B: AgentBackend> RecordingBackend<B> {
    /// Wrap a backend to record all batches
    pub fn wrap(inner: B) -> (Self, Transcript) {
        let transcript = Transcript::default();
        (
            Self {
                inner,
                transcript: transcript.clone(),
            },
            transcript,
        )
    }

    /// Wrap and spawn in one step
    pub fn spawn(inner: B) -> (AgentHandle, Transcript) {
        let (backend, transcript) = Self::wrap(inner);
        (AgentHandle::spawn(backend), transcript)
    }
}

impl<B: AgentBackend> AgentBackend for RecordingBackend<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn respond<'a>(
        &'a mut self,
        agent_id: &'a str,
        records: &'a [MessageRecord],
    ) -> BoxFuture<'a, Result<BoxStream<'a, AgentEvent>>> {
        self.transcript
            .batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(records.to_vec());
        self.inner.respond(agent_id, records)
    }
}
