// ABOUTME: Seams between the chat core and the outside world.
// ABOUTME: HumanOutput renders messages for the person at the console; CollectingOutput captures them in tests.

use crate::mentions::{strip_mention, HUMAN};
use parley_agent::MessageRecord;
use std::sync::Mutex;

/// Renders messages addressed to `human`.
///
/// Called from the poll loop, so implementations should not block for long.
pub trait HumanOutput: Send + Sync {
    fn deliver(&self, records: &[MessageRecord]);
}

/// The text a human sees for `record`: body with `@human` removed
pub fn human_view(record: &MessageRecord) -> String {
    strip_mention(&record.body, HUMAN)
}

/// HumanOutput that keeps every delivered line
#[derive(Debug, Default)]
pub struct CollectingOutput {
    lines: Mutex<Vec<String>>,
}

impl CollectingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl HumanOutput for CollectingOutput {
    fn deliver(&self, records: &[MessageRecord]) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.extend(records.iter().map(human_view));
    }
}
