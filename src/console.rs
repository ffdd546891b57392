// ABOUTME: Console human I/O - prints messages for @human and turns stdin lines into commands or chat.
// ABOUTME: Input runs as its own task so waiting for a line never blocks the poll loop.

use crate::app::remove_agent;
use parley_core::commands::help_text;
use parley_core::time_expr::format_local;
use parley_core::{
    format_log_line, human_view, parse_console_line, ConsoleCommand, HumanOutput,
    ReminderScheduler, Router, Trigger, HUMAN,
};
use parley_agent::MessageRecord;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const PROMPT: &str = "> ";

/// Prints messages addressed to the human on stdout
#[derive(Debug, Default)]
pub struct ConsoleOutput;

/// `sender: text` with `@human` removed
pub fn render(record: &MessageRecord) -> String {
    format!("{}: {}", record.sender, human_view(record))
}

impl HumanOutput for ConsoleOutput {
    fn deliver(&self, records: &[MessageRecord]) {
        let mut out = std::io::stdout().lock();
        // Clear the pending prompt before printing
        let _ = write!(out, "\r");
        for record in records {
            let _ = writeln!(out, "{}", render(record));
        }
        let _ = write!(out, "{PROMPT}");
        let _ = out.flush();
    }
}

/// What the input loop should do after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Print these lines and keep reading
    Continue(Vec<String>),
    Exit,
}

/// Executes console commands against the running chat
pub struct Console {
    router: Arc<Router>,
    scheduler: Arc<ReminderScheduler>,
    default_recipient: String,
}

impl Console {
    pub fn new(
        router: Arc<Router>,
        scheduler: Arc<ReminderScheduler>,
        default_recipient: impl Into<String>,
    ) -> Self {
        Self {
            router,
            scheduler,
            default_recipient: default_recipient.into(),
        }
    }

    pub fn handle_line(&self, line: &str) -> ConsoleAction {
        let output = match parse_console_line(line) {
            ConsoleCommand::Exit => return ConsoleAction::Exit,
            ConsoleCommand::Empty => Vec::new(),
            ConsoleCommand::Chat => self.dump_log(),
            ConsoleCommand::Log => {
                let enabled = self.router.toggle_log_messages();
                vec![format!(
                    "Message logging {}",
                    if enabled { "enabled" } else { "disabled" }
                )]
            }
            ConsoleCommand::Reminders => self.list_reminders(),
            ConsoleCommand::Cancel(id) => {
                if self.scheduler.cancel(&id) {
                    vec![format!("Cancelled {id}")]
                } else {
                    vec![format!("No active reminder {id}")]
                }
            }
            ConsoleCommand::Agents => self.list_agents(),
            ConsoleCommand::Kick(name) => match remove_agent(&self.router, &name) {
                Ok(()) => vec![format!("Removed {name}")],
                Err(e) => vec![format!("Not removed: {e}")],
            },
            ConsoleCommand::Help => help_text().lines().map(str::to_string).collect(),
            ConsoleCommand::Message(text) => {
                match self
                    .router
                    .post_with_default(HUMAN, &text, &self.default_recipient)
                {
                    Ok(_) => Vec::new(),
                    Err(e) => vec![format!("Not sent: {e}")],
                }
            }
        };
        ConsoleAction::Continue(output)
    }

    fn dump_log(&self) -> Vec<String> {
        let tz = self.scheduler.timezone();
        let history = self.router.history();
        if history.is_empty() {
            return vec!["No messages yet.".to_string()];
        }
        history
            .iter()
            .map(|r| {
                format!(
                    "[{}] {}: {}",
                    r.timestamp.with_timezone(&tz).format("%H:%M:%S"),
                    r.sender,
                    r.body
                )
            })
            .collect()
    }

    fn list_reminders(&self) -> Vec<String> {
        let tz = self.scheduler.timezone();
        let reminders = self.scheduler.list();
        if reminders.is_empty() {
            return vec!["No active reminders.".to_string()];
        }
        reminders
            .iter()
            .map(|r| {
                let when = match r.trigger {
                    Trigger::At(at) => format_local(at, tz),
                    Trigger::When { ref tag, .. } => format!("when {tag}"),
                };
                format!("{}  @{}  {}  {}", r.id, r.owner, when, r.message)
            })
            .collect()
    }

    fn list_agents(&self) -> Vec<String> {
        let agents = self.router.agents().snapshot();
        if agents.is_empty() {
            return vec!["No agents registered.".to_string()];
        }
        agents
            .iter()
            .map(|(name, handle)| {
                format!(
                    "{name} ({}) {}",
                    handle.name(),
                    if handle.is_busy() { "busy" } else { "idle" }
                )
            })
            .collect()
    }

    /// Read lines until `EXIT` or end of input
    pub async fn run<R>(&self, input: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        prompt();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("Console input closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read console input");
                    break;
                }
            };
            match self.handle_line(&line) {
                ConsoleAction::Exit => break,
                ConsoleAction::Continue(output) => {
                    for text in output {
                        println!("{text}");
                    }
                    prompt();
                }
            }
        }
    }
}

fn prompt() {
    print!("{PROMPT}");
    let _ = std::io::stdout().flush();
}

/// Print `[LOG]` lines for every accepted post while message logging is on
pub fn spawn_log_watcher(router: Arc<Router>) -> JoinHandle<()> {
    let mut rx = router.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => {
                    if router.log_messages() {
                        println!("\r{}", format_log_line(&record));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Log watcher fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
