// ABOUTME: Offline reminder management - list, add, cancel, complete and remove entries in the markdown store.
// ABOUTME: Works on the file directly; a running chat picks up new pending entries on its next start.

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use parley_core::mentions::is_valid_identifier;
use parley_core::reminder_store::reminder_id;
use parley_core::time_expr::{parse_due, LOCAL_FORMAT};
use parley_core::{ReminderEntry, ReminderStatus, ReminderStore};

#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ReminderAction {
    /// List stored reminders
    List {
        /// Only show reminders with this status (pending, triggered, finished, cancelled)
        #[arg(long)]
        status: Option<String>,
    },
    /// Add a pending reminder
    Add {
        /// Who should be reminded
        #[arg(long)]
        owner: String,
        /// When: "in 10 minutes", "2030-01-31 09:00", "tomorrow 9am"
        #[arg(long)]
        due: String,
        /// Reminder text
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Mark a pending reminder cancelled
    Cancel { id: String },
    /// Mark a reminder finished
    Complete { id: String },
    /// Delete a reminder from the file
    Remove { id: String },
}

/// Run one action and return the lines to print
pub fn run(store: &ReminderStore, tz: Tz, action: ReminderAction) -> Result<Vec<String>> {
    match action {
        ReminderAction::List { status } => {
            let status = status
                .as_deref()
                .map(str::parse::<ReminderStatus>)
                .transpose()?;
            let entries = store.list(status)?;
            if entries.is_empty() {
                return Ok(vec!["No reminders.".to_string()]);
            }
            Ok(entries.iter().map(describe).collect())
        }
        ReminderAction::Add { owner, due, text } => {
            let owner = owner.trim_start_matches('@');
            if !is_valid_identifier(owner) {
                anyhow::bail!("Invalid owner '{}': use letters, digits and underscores", owner);
            }
            let at = parse_due(&due, tz)?;
            let id = reminder_id(Utc::now().timestamp_micros(), owner);
            let task = text.join(" ");
            let local = at.with_timezone(&tz).naive_local();

            store.ensure_exists()?;
            store
                .add(ReminderEntry::pending(&id, &task, Some(local), None))
                .with_context(|| format!("Failed to add reminder to {}", store.path().display()))?;
            tracing::info!(reminder = %id, owner = %owner, "Reminder added offline");
            Ok(vec![format!(
                "Added {id} for @{owner} at {} ({tz})",
                local.format(LOCAL_FORMAT)
            )])
        }
        ReminderAction::Cancel { id } => set_status(store, &id, ReminderStatus::Cancelled),
        ReminderAction::Complete { id } => set_status(store, &id, ReminderStatus::Finished),
        ReminderAction::Remove { id } => {
            if store.remove(&id)? {
                Ok(vec![format!("Removed {id}")])
            } else {
                anyhow::bail!("No reminder with id {}", id)
            }
        }
    }
}

fn set_status(store: &ReminderStore, id: &str, status: ReminderStatus) -> Result<Vec<String>> {
    if store.set_status(id, status)? {
        Ok(vec![format!("{id} is now {status}")])
    } else {
        anyhow::bail!("No reminder with id {}", id)
    }
}

fn describe(entry: &ReminderEntry) -> String {
    let due = entry
        .due
        .map(|d| d.format(LOCAL_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "[{}] {}  {}  {}  {}",
        if entry.checked { "x" } else { " " },
        entry.id,
        due,
        entry.status,
        entry.task
    )
}
