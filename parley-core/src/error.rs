// ABOUTME: Error taxonomy for routing, dispatch, reminder persistence and model calls.
// ABOUTME: Callers match on these; application code wraps them in anyhow.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Message had no parseable mention and the policy is to reject it
    #[error("message has no @mention and empty-mention messages are rejected")]
    EmptyRecipients,

    #[error("no agent registered as '{0}'")]
    UnknownRecipient(String),

    #[error("agent '{agent}' failed to respond: {reason}")]
    AgentDispatchFailure { agent: String, reason: String },

    #[error("malformed reminder line {line}: {reason}")]
    MalformedPersistedRecord { line: usize, reason: String },

    #[error("model call failed: {0}")]
    UpstreamModelError(String),

    #[error("'{0}' is reserved and cannot be used as an agent name")]
    ReservedName(String),

    #[error("invalid agent name '{0}': use letters, digits and underscores")]
    InvalidAgentName(String),
}
