//! Bounded, restorable record of past automatic closures.

use crate::protocol::HistoryEntry;
use serde_json::Value;

/// Maximum entries kept; appending past this evicts the oldest.
pub const HISTORY_CAPACITY: usize = 15;

/// Newest-first closure log.
///
/// Entries are addressed by position. That is inherently racy against
/// concurrent appends, so the runtime serializes restores and appends in the
/// same process; keying entries by a stable id would remove the constraint
/// but is not part of the stored format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend an entry, evicting the oldest once the log is full.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    /// Remove and return the entry at `index`. Out of range is a no-op.
    pub fn take(&mut self, index: usize) -> Option<HistoryEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode the persisted log. A wrong-shaped value yields the empty log;
    /// entries that fail to decode are dropped individually. The capacity
    /// bound is re-applied on load in case older data exceeded it.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut entries = Vec::new();
        if let Some(Value::Array(items)) = value {
            for item in items {
                if let Ok(entry) = serde_json::from_value::<HistoryEntry>(item.clone()) {
                    entries.push(entry);
                }
            }
        }
        entries.truncate(HISTORY_CAPACITY);
        Self { entries }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Array(Vec::new()))
    }
}
