// ABOUTME: Core AgentBackend trait that all backends implement.
// ABOUTME: A backend turns a batch of unread messages into a stream of AgentEvents.

use crate::{AgentEvent, MessageRecord};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// Core trait that all agent backends implement.
///
/// A backend is owned by exactly one worker task (see `AgentHandle::spawn`),
/// so methods take `&mut self` and may keep conversation state between calls.
pub trait AgentBackend: Send + 'static {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Answer a batch of messages addressed to `agent_id`, oldest first.
    ///
    /// The returned stream emits text chunks and completes with a Result or
    /// Error event. Returning `Err` means the backend failed before producing
    /// any events.
    fn respond<'a>(
        &'a mut self,
        agent_id: &'a str,
        records: &'a [MessageRecord],
    ) -> BoxFuture<'a, Result<BoxStream<'a, AgentEvent>>>;
}
