// ABOUTME: MessageRecord - one entry of the group chat log as seen by agents.
// ABOUTME: Receivers come from @mentions; readers grow as the record is delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single message in the chat log.
///
/// Everything except `readers` is fixed at creation. Agents receive clones,
/// so mutating a record handed to a backend never touches the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Position in the log, assigned on append
    pub seq: u64,
    /// Agent name, "human" or "system"
    pub sender: String,
    /// Message text
    pub body: String,
    /// Creation time, non-decreasing across the log
    pub timestamp: DateTime<Utc>,
    /// Identifiers mentioned in the body
    pub receivers: BTreeSet<String>,
    /// Identifiers this record has already been delivered to
    pub readers: BTreeSet<String>,
}

impl MessageRecord {
    /// True if `id` is an explicit receiver of this record
    pub fn is_addressed_to(&self, id: &str) -> bool {
        self.receivers.contains(id)
    }

    /// True if the record was already delivered to `id`
    pub fn has_been_read_by(&self, id: &str) -> bool {
        self.readers.contains(id)
    }

    /// `sender: body`, the form agents see in their prompt
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.sender, self.body)
    }
}

/// Format a batch of records as transcript lines, oldest first.
pub fn format_batch(records: &[MessageRecord]) -> String {
    records
        .iter()
        .map(MessageRecord::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seq: u64, sender: &str, body: &str) -> MessageRecord {
        MessageRecord {
            seq,
            sender: sender.to_string(),
            body: body.to_string(),
            timestamp: Utc::now(),
            receivers: ["alice".to_string()].into_iter().collect(),
            readers: BTreeSet::new(),
        }
    }

    #[test]
    fn test_transcript_line() {
        let r = record(0, "human", "hi @alice");
        assert_eq!(r.transcript_line(), "human: hi @alice");
    }

    #[test]
    fn test_format_batch_keeps_order() {
        let batch = vec![record(0, "human", "first"), record(1, "bob", "second")];
        assert_eq!(format_batch(&batch), "human: first\nbob: second");
    }

    #[test]
    fn test_format_batch_empty() {
        assert_eq!(format_batch(&[]), "");
    }

    #[test]
    fn test_addressing_and_reading() {
        let mut r = record(0, "human", "hi");
        assert!(r.is_addressed_to("alice"));
        assert!(!r.is_addressed_to("bob"));
        assert!(!r.has_been_read_by("alice"));
        r.readers.insert("alice".to_string());
        assert!(r.has_been_read_by("alice"));
    }
}
