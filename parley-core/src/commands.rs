// ABOUTME: Console command parsing - upper-case literal commands versus chat messages.
// ABOUTME: Anything that is not a command and not blank is a message from the human.

/// One parsed line of console input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Dump the whole message log
    Chat,
    /// Toggle per-message console logging
    Log,
    /// Stop everything and quit
    Exit,
    /// List active reminders
    Reminders,
    /// Cancel a reminder by id
    Cancel(String),
    /// List registered agents and whether they are busy
    Agents,
    /// Remove an agent from the chat
    Kick(String),
    Help,
    /// A chat message from the human
    Message(String),
    /// Blank line, nothing to do
    Empty,
}

/// Parse a console line. Commands are case-sensitive, so `exit` is a message.
pub fn parse_console_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleCommand::Empty;
    }

    match trimmed {
        "CHAT" => return ConsoleCommand::Chat,
        "LOG" => return ConsoleCommand::Log,
        "EXIT" => return ConsoleCommand::Exit,
        "REMINDERS" => return ConsoleCommand::Reminders,
        "AGENTS" => return ConsoleCommand::Agents,
        "HELP" => return ConsoleCommand::Help,
        _ => {}
    }

    if let Some(id) = single_argument(trimmed, "CANCEL") {
        return ConsoleCommand::Cancel(id.to_string());
    }
    if let Some(name) = single_argument(trimmed, "KICK") {
        return ConsoleCommand::Kick(name.trim_start_matches('@').to_string());
    }

    ConsoleCommand::Message(trimmed.to_string())
}

/// The one word after `command`. `CANCELLED plans` is not `CANCEL` with an argument.
fn single_argument<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(command)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let arg = rest.trim();
    (!arg.is_empty() && !arg.contains(char::is_whitespace)).then_some(arg)
}

/// Text printed for `HELP`
pub fn help_text() -> &'static str {
    "Commands:\n  \
     CHAT           show the whole conversation\n  \
     LOG            toggle logging of every message\n  \
     REMINDERS      list active reminders\n  \
     CANCEL <id>    cancel a reminder\n  \
     AGENTS         list agents and whether they are busy\n  \
     KICK <name>    remove an agent from the chat\n  \
     HELP           show this text\n  \
     EXIT           quit\n\
     Anything else is sent to the chat. Use @name to address an agent."
}
