// ABOUTME: Event types emitted by agent backends while answering a batch of messages.
// ABOUTME: Text chunks stream in, then a Result or Error closes the exchange.

use serde::{Deserialize, Serialize};

/// Events emitted by agent backends during a respond call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    /// Streaming text chunk
    Text(String),

    /// Final result with optional usage statistics
    Result {
        /// The final text response
        text: String,
        /// Token usage (if the backend reports it)
        usage: Option<Usage>,
    },

    /// Error occurred during execution
    Error {
        /// Typed error code for programmatic handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Whether the error is recoverable (can retry)
        recoverable: bool,
    },
}

/// Typed error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Request timed out
    Timeout,
    /// Rate limited by the model provider
    RateLimited,
    /// Authentication failed
    AuthFailed,
    /// Backend-specific error
    BackendError,
    /// Unknown error
    Unknown,
}

/// Token usage reported by model-backed agents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    /// Input tokens consumed
    pub input_tokens: u64,
    /// Output tokens generated
    pub output_tokens: u64,
}
