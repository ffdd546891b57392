// ABOUTME: Append-only message log with per-record reader sets.
// ABOUTME: Unread queries are recomputed from the log on every call, oldest first.

use crate::mentions::{parse_mentions, ALL};
use chrono::{DateTime, Utc};
use parley_agent::MessageRecord;
use std::collections::BTreeSet;

/// The ordered message log. Not synchronized; the router owns it behind a lock.
#[derive(Debug, Default)]
pub struct MessageLog {
    records: Vec<MessageRecord>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record, deriving receivers from the body.
    pub fn append(&mut self, sender: &str, body: &str) -> MessageRecord {
        self.append_with_receivers(sender, body, parse_mentions(body))
    }

    /// Append a record with an explicit receiver set.
    ///
    /// Timestamps never go backwards even if the wall clock does.
    pub fn append_with_receivers(
        &mut self,
        sender: &str,
        body: &str,
        receivers: BTreeSet<String>,
    ) -> MessageRecord {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);

        let record = MessageRecord {
            seq: self.records.len() as u64,
            sender: sender.to_string(),
            body: body.to_string(),
            timestamp,
            receivers,
            readers: BTreeSet::new(),
        };
        self.records.push(record.clone());
        record
    }

    /// Records addressed to `id` that `id` has not read, in log order.
    ///
    /// With `include_broadcast`, records mentioning `@all` count as addressed
    /// to `id` unless `id` sent them.
    pub fn unread(&self, id: &str, include_broadcast: bool) -> Vec<MessageRecord> {
        self.records
            .iter()
            .filter(|r| !r.has_been_read_by(id))
            .filter(|r| {
                r.is_addressed_to(id)
                    || (include_broadcast && r.is_addressed_to(ALL) && r.sender != id)
            })
            .cloned()
            .collect()
    }

    /// Add `id` to the readers of each record. Returns how many were newly read.
    pub fn mark_read(&mut self, id: &str, seqs: impl IntoIterator<Item = u64>) -> usize {
        let mut newly = 0;
        for seq in seqs {
            if let Some(record) = self.records.get_mut(seq as usize) {
                if record.readers.insert(id.to_string()) {
                    newly += 1;
                }
            }
        }
        newly
    }

    pub fn get(&self, seq: u64) -> Option<&MessageRecord> {
        self.records.get(seq as usize)
    }

    /// Snapshot of the entire log
    pub fn records(&self) -> Vec<MessageRecord> {
        self.records.clone()
    }
}
