// ABOUTME: Group-chat core - mention routing, idle-poll dispatch and reminder scheduling.
// ABOUTME: Also holds the markdown reminder store, configuration and the built-in system agent.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod log;
pub mod mentions;
pub mod metrics;
pub mod paths;
pub mod registry;
pub mod reminder_store;
pub mod router;
pub mod scheduler;
pub mod system_agent;
pub mod time_expr;
pub mod traits;

pub use commands::{parse_console_line, ConsoleCommand};
pub use config::Config;
pub use dispatch::{DispatchOutcome, Dispatcher, TickReport};
pub use error::ChatError;
pub use mentions::{parse_mentions, ALL, HUMAN, SYSTEM};
pub use registry::AgentRegistry;
pub use reminder_store::{ReminderEntry, ReminderStatus, ReminderStore};
pub use router::{format_log_line, EmptyMentionPolicy, Router};
pub use scheduler::{Notifier, Predicate, Reminder, ReminderKind, ReminderScheduler, Trigger};
pub use system_agent::SystemAgent;
pub use traits::{human_view, CollectingOutput, HumanOutput};

// Re-export parley-agent types
pub use parley_agent::{AgentEvent, AgentHandle, MessageRecord};
