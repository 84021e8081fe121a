use serde::{Deserialize, Serialize};

/// Tab identifier assigned by the host browser. Unique per open tab.
pub type TabId = i64;

/// Wall-clock timestamp in milliseconds since the Unix epoch.
pub type EpochMillis = u64;

/// Read-only snapshot of one open tab, supplied by the tab host on every
/// sweep. Internal pages may carry no URL, and tabs that are still being
/// created may carry no id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    #[serde(default)]
    pub id: Option<TabId>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub audible: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
}

impl TabInfo {
    /// Best human-readable label for logs: title, then URL, then a placeholder.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or("(unknown tab)")
    }
}

/// Why a tab was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalReason {
    /// Idle longer than the normal timeout.
    Timeout,
    /// Idle longer than the full-cleanup ceiling (overrides the whitelist).
    FullCleanup,
    /// No recorded activity and the fail-safe closure policy is in effect.
    Unknown,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Timeout => write!(f, "timeout"),
            RemovalReason::FullCleanup => write!(f, "fullCleanup"),
            RemovalReason::Unknown => write!(f, "unknown"),
        }
    }
}

/// One restorable record of an automatic closure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: String,
    pub removed_at: EpochMillis,
    pub reason: RemovalReason,
}

impl HistoryEntry {
    /// Build the closure record for a tab. The title falls back to the URL
    /// when the tab has none, matching what restore UIs display.
    pub fn for_tab(tab: &TabInfo, url: &str, reason: RemovalReason, now: EpochMillis) -> Self {
        Self {
            url: url.to_string(),
            title: tab.title.clone().unwrap_or_else(|| url.to_string()),
            fav_icon_url: tab.fav_icon_url.clone().unwrap_or_default(),
            removed_at: now,
            reason,
        }
    }
}

/// Toast payload recorded at closure time and surfaced on the next popup
/// open. Kept separate from [`HistoryEntry`] so the restore list and the
/// unseen-notification cursor can evolve independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    pub title: String,
    pub url: String,
    pub reason: RemovalReason,
    pub removed_at: EpochMillis,
    pub tab_id: TabId,
}

impl NotificationEntry {
    pub fn for_tab(
        tab: &TabInfo,
        tab_id: TabId,
        url: &str,
        reason: RemovalReason,
        now: EpochMillis,
    ) -> Self {
        Self {
            title: tab.title.clone().unwrap_or_else(|| url.to_string()),
            url: url.to_string(),
            reason,
            removed_at: now,
            tab_id,
        }
    }
}
