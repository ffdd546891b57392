// ABOUTME: Mention router - posts into the shared message log and answers unread queries.
// ABOUTME: Owns the agent registry, applies the empty-mention policy and broadcasts accepted posts.

use crate::error::ChatError;
use crate::log::MessageLog;
use crate::mentions::parse_mentions;
use crate::metrics;
use crate::registry::AgentRegistry;
use parley_agent::MessageRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// What to do with a message that mentions nobody
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyMentionPolicy {
    /// Keep it in the log; it is never delivered
    #[default]
    Store,
    /// Refuse it with `ChatError::EmptyRecipients`
    Reject,
}

impl std::fmt::Display for EmptyMentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmptyMentionPolicy::Store => write!(f, "store"),
            EmptyMentionPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for EmptyMentionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "store" => Ok(EmptyMentionPolicy::Store),
            "reject" => Ok(EmptyMentionPolicy::Reject),
            _ => anyhow::bail!("Unknown empty-mention policy: {} (use store or reject)", s),
        }
    }
}

pub struct Router {
    log: Mutex<MessageLog>,
    agents: AgentRegistry,
    policy: EmptyMentionPolicy,
    log_messages: AtomicBool,
    events: broadcast::Sender<MessageRecord>,
}

impl Router {
    pub fn new(policy: EmptyMentionPolicy) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            log: Mutex::new(MessageLog::new()),
            agents: AgentRegistry::new(),
            policy,
            log_messages: AtomicBool::new(false),
            events,
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn policy(&self) -> EmptyMentionPolicy {
        self.policy
    }

    /// Parse mentions from `body` and append it to the log.
    pub fn post(&self, sender: &str, body: &str) -> Result<MessageRecord, ChatError> {
        self.post_to(sender, body, parse_mentions(body))
    }

    /// Like `post`, but `default_recipient` is always one of the receivers.
    pub fn post_with_default(
        &self,
        sender: &str,
        body: &str,
        default_recipient: &str,
    ) -> Result<MessageRecord, ChatError> {
        let mut receivers = parse_mentions(body);
        receivers.insert(default_recipient.to_string());
        self.post_to(sender, body, receivers)
    }

    fn post_to(
        &self,
        sender: &str,
        body: &str,
        receivers: BTreeSet<String>,
    ) -> Result<MessageRecord, ChatError> {
        if receivers.is_empty() && self.policy == EmptyMentionPolicy::Reject {
            metrics::record_message_rejected();
            tracing::debug!(sender = %sender, "Rejected message without mentions");
            return Err(ChatError::EmptyRecipients);
        }

        let record = self
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append_with_receivers(sender, body, receivers);

        metrics::record_message_posted(sender);
        tracing::debug!(
            seq = record.seq,
            sender = %record.sender,
            receivers = ?record.receivers,
            "Message posted"
        );

        // No subscribers is fine
        let _ = self.events.send(record.clone());
        Ok(record)
    }

    /// Unread records for `id`, oldest first.
    ///
    /// `@all` records count for registered agents other than their sender.
    pub fn unread(&self, id: &str) -> Vec<MessageRecord> {
        let include_broadcast = self.agents.contains(id);
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unread(id, include_broadcast)
    }

    /// Mark `records` read for `id`. Idempotent; returns how many were newly read.
    pub fn mark_read(&self, id: &str, records: &[MessageRecord]) -> usize {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .mark_read(id, records.iter().map(|r| r.seq))
    }

    /// Snapshot of the whole log
    pub fn history(&self) -> Vec<MessageRecord> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).records()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive every accepted post from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MessageRecord> {
        self.events.subscribe()
    }

    pub fn log_messages(&self) -> bool {
        self.log_messages.load(Ordering::Relaxed)
    }

    pub fn set_log_messages(&self, enabled: bool) {
        self.log_messages.store(enabled, Ordering::Relaxed);
    }

    /// Flip per-message console logging; returns the new state
    pub fn toggle_log_messages(&self) -> bool {
        !self.log_messages.fetch_xor(true, Ordering::Relaxed)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(EmptyMentionPolicy::default())
    }
}

/// `[LOG] From <sender> to <receivers>: <body>`
pub fn format_log_line(record: &MessageRecord) -> String {
    let receivers: Vec<&str> = record.receivers.iter().map(String::as_str).collect();
    format!(
        "[LOG] From {} to [{}]: {}",
        record.sender,
        receivers.join(", "),
        record.body
    )
}
