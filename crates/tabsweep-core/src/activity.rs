//! Last-activity bookkeeping for open tabs.
//!
//! The tracker is an owned, injectable table rather than a module-level
//! singleton so the sweep planner can be exercised with synthetic clocks.
//! It is persisted across restarts: a tab that was already idle for hours
//! stays eligible for closure in the first sweep after the process comes
//! back, instead of every tab getting a fresh grace period.

use crate::protocol::{EpochMillis, TabId, TabInfo};
use serde_json::Value;
use std::collections::HashMap;

/// Maps each known tab to the timestamp of its last observed interaction.
///
/// Exclusively owned and mutated through these methods; the sweep planner
/// only reads it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityTracker {
    stamps: HashMap<TabId, EpochMillis>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user interaction with the tab.
    pub fn record(&mut self, tab_id: TabId, now: EpochMillis) {
        self.stamps.insert(tab_id, now);
    }

    /// Drop the entry for a closed tab so the table does not grow without
    /// bound over a long-running session.
    pub fn forget(&mut self, tab_id: TabId) {
        self.stamps.remove(&tab_id);
    }

    /// Stamp every open tab with the same base instant. Runs once per
    /// process start so tabs that predate this run are not judged
    /// "never active" and swept immediately.
    pub fn seed_all(&mut self, tabs: &[TabInfo], now: EpochMillis) {
        for tab in tabs {
            if let Some(id) = tab.id {
                self.stamps.insert(id, now);
            }
        }
    }

    pub fn last_activity(&self, tab_id: TabId) -> Option<EpochMillis> {
        self.stamps.get(&tab_id).copied()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Decode a persisted table. Anything that is not an object of numeric
    /// stamps yields the empty table; individual malformed entries are
    /// dropped rather than failing the whole load.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut stamps = HashMap::new();
        if let Some(Value::Object(map)) = value {
            for (key, stamp) in map {
                let Ok(tab_id) = key.parse::<TabId>() else {
                    continue;
                };
                if let Some(ms) = stamp.as_u64() {
                    stamps.insert(tab_id, ms);
                }
            }
        }
        Self { stamps }
    }

    /// Encode for persistence. JSON object keys are strings, so tab ids are
    /// stringified the same way the host storage did it.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.stamps
                .iter()
                .map(|(id, ms)| (id.to_string(), Value::from(*ms)))
                .collect(),
        )
    }
}
