//! Closure notifications destined for toast display.
//!
//! Populated at the same moment as the history log but kept as its own
//! queue: the popup shows each closure once, driven by a "last checked"
//! cursor, while history entries live until restored or cleared.

use crate::protocol::{EpochMillis, NotificationEntry};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationQueue {
    entries: Vec<NotificationEntry>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: NotificationEntry) {
        self.entries.push(entry);
    }

    /// Notifications the user has not seen yet: strictly newer than the
    /// last-checked cursor.
    pub fn unseen_since(&self, last_check: EpochMillis) -> Vec<NotificationEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.removed_at > last_check)
            .cloned()
            .collect()
    }

    /// Drop entries at or before the cursor. They can never be shown again,
    /// so keeping them would only grow the queue without bound.
    pub fn prune_seen(&mut self, last_check: EpochMillis) {
        self.entries.retain(|entry| entry.removed_at > last_check);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[NotificationEntry] {
        &self.entries
    }

    pub fn from_value(value: Option<&Value>) -> Self {
        let mut entries = Vec::new();
        if let Some(Value::Array(items)) = value {
            for item in items {
                if let Ok(entry) = serde_json::from_value::<NotificationEntry>(item.clone()) {
                    entries.push(entry);
                }
            }
        }
        Self { entries }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Array(Vec::new()))
    }
}
