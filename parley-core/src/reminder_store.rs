// ABOUTME: Markdown-backed reminder store - one pipe-delimited checklist line per reminder.
// ABOUTME: Reads skip malformed lines with a warning; writes rewrite the whole file.

use crate::error::ChatError;
use crate::metrics;
use crate::time_expr::{parse_local, LOCAL_FORMAT};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const HEADER: &str = "# Reminders";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Triggered,
    Finished,
    Cancelled,
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderStatus::Pending => write!(f, "pending"),
            ReminderStatus::Triggered => write!(f, "triggered"),
            ReminderStatus::Finished => write!(f, "finished"),
            ReminderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ReminderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ReminderStatus::Pending),
            "triggered" => Ok(ReminderStatus::Triggered),
            "finished" | "completed" => Ok(ReminderStatus::Finished),
            "cancelled" | "canceled" => Ok(ReminderStatus::Cancelled),
            _ => anyhow::bail!("Unknown reminder status: {}", s),
        }
    }
}

/// One line of the reminder file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderEntry {
    /// `[x]` when the reminder is no longer pending
    pub checked: bool,
    pub id: String,
    pub task: String,
    /// Local wall-clock due time; None for condition reminders
    pub due: Option<NaiveDateTime>,
    pub status: ReminderStatus,
    /// Name of the check for condition reminders
    pub condition: Option<String>,
}

impl ReminderEntry {
    pub fn pending(
        id: &str,
        task: &str,
        due: Option<NaiveDateTime>,
        condition: Option<&str>,
    ) -> Self {
        Self {
            checked: false,
            id: id.to_string(),
            task: task.to_string(),
            due,
            status: ReminderStatus::Pending,
            condition: condition.map(str::to_string),
        }
    }

    /// Owner encoded in ids of the form `reminder_<micros>_<owner>`
    pub fn owner(&self) -> Option<&str> {
        owner_from_id(&self.id)
    }

    /// `- [ ] | id | task | YYYY-MM-DD HH:MM | status | condition-tag`
    pub fn to_line(&self) -> String {
        format!(
            "- [{}] | {} | {} | {} | {} | {}",
            if self.checked { "x" } else { " " },
            self.id,
            self.task.replace('\n', " "),
            self.due
                .map(|d| d.format(LOCAL_FORMAT).to_string())
                .unwrap_or_default(),
            self.status,
            self.condition.as_deref().unwrap_or("")
        )
    }

    /// Parse one reminder line. `line_no` is 1-based and only used in errors.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self, ChatError> {
        let malformed = |reason: &str| ChatError::MalformedPersistedRecord {
            line: line_no,
            reason: reason.to_string(),
        };

        let line = line.trim();
        let (checked, rest) = if let Some(rest) = line.strip_prefix("- [ ]") {
            (false, rest)
        } else if let Some(rest) = line
            .strip_prefix("- [x]")
            .or_else(|| line.strip_prefix("- [X]"))
        {
            (true, rest)
        } else {
            return Err(malformed("expected '- [ ]' or '- [x]'"));
        };

        let parts: Vec<&str> = rest.split('|').map(str::trim).collect();
        // Leading empty field, then id, task, due, status, condition. Task text may contain '|'.
        if parts.len() < 6 || !parts[0].is_empty() {
            return Err(malformed("expected 5 '|' separated fields"));
        }
        let n = parts.len();
        let id = parts[1];
        let task = parts[2..n - 3].join(" | ");
        let due_str = parts[n - 3];
        let status_str = parts[n - 2];
        let condition = parts[n - 1];

        if id.is_empty() {
            return Err(malformed("missing id"));
        }

        let due = if due_str.is_empty() {
            None
        } else {
            Some(parse_local(due_str.trim_matches('"')).ok_or_else(|| malformed("bad due time"))?)
        };

        let status = status_str
            .parse::<ReminderStatus>()
            .map_err(|e| malformed(&e.to_string()))?;

        Ok(Self {
            checked,
            id: id.to_string(),
            task,
            due,
            status,
            condition: (!condition.is_empty()).then(|| condition.to_string()),
        })
    }
}

/// Build a `reminder_<micros>_<owner>` id
pub fn reminder_id(stamp_micros: i64, owner: &str) -> String {
    format!("reminder_{stamp_micros}_{owner}")
}

/// Owner part of a `reminder_<micros>_<owner>` id
pub fn owner_from_id(id: &str) -> Option<&str> {
    let mut parts = id.splitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("reminder"), Some(stamp), Some(owner))
            if !owner.is_empty() && stamp.chars().all(|c| c.is_ascii_digit()) =>
        {
            Some(owner)
        }
        _ => None,
    }
}

/// Reminder file on disk
#[derive(Debug, Clone)]
pub struct ReminderStore {
    path: PathBuf,
}

impl ReminderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file (and parent directories) with just a header if missing
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        self.save(&[])
    }

    /// Every well-formed entry in file order. A missing file is empty.
    pub fn load(&self) -> Result<Vec<ReminderEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match ReminderEntry::parse_line(trimmed, idx + 1) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Skipping reminder line"
                    );
                    metrics::record_error("malformed_reminder_line");
                }
            }
        }
        Ok(entries)
    }

    /// Rewrite the file with `entries`
    pub fn save(&self, entries: &[ReminderEntry]) -> Result<()> {
        let mut content = String::from(HEADER);
        content.push_str("\n\n");
        for entry in entries {
            content.push_str(&entry.to_line());
            content.push('\n');
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Append `entry`, replacing any entry with the same id
    pub fn add(&self, entry: ReminderEntry) -> Result<()> {
        let mut entries = self.load()?;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        self.save(&entries)
    }

    pub fn get(&self, id: &str) -> Result<Option<ReminderEntry>> {
        Ok(self.load()?.into_iter().find(|e| e.id == id))
    }

    /// Set the status of `id`; anything but pending is checked. Returns false if absent.
    pub fn set_status(&self, id: &str, status: ReminderStatus) -> Result<bool> {
        let mut entries = self.load()?;
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };
        entry.status = status;
        entry.checked = status != ReminderStatus::Pending;
        self.save(&entries)?;
        Ok(true)
    }

    /// Delete `id`. Returns false if absent.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    /// Entries, optionally only those with `status`, sorted by due time (undated last)
    pub fn list(&self, status: Option<ReminderStatus>) -> Result<Vec<ReminderEntry>> {
        let mut entries: Vec<ReminderEntry> = self
            .load()?
            .into_iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .collect();
        entries.sort_by(|a, b| match (a.due, b.due) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(entries)
    }
}
