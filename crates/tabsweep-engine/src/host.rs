//! Tab inventory/control seam.

use async_trait::async_trait;
use tabsweep_core::protocol::{TabId, TabInfo};

#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// The tab is already gone, e.g. the user closed it concurrently with
    /// the sweep decision.
    #[error("tab {0} not found")]
    TabNotFound(TabId),

    #[error("host io: {0}")]
    Io(String),

    /// The host did not answer within the per-call ceiling.
    #[error("host call timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// The browser-side collaborator: list open tabs, close one, open one.
///
/// Closing is best-effort from the sweeper's point of view: a per-tab
/// failure is logged and swallowed, never allowed to abort the remaining
/// sweep iterations.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// Snapshot of all currently open tabs.
    async fn query_tabs(&self) -> Result<Vec<TabInfo>, HostError>;

    /// Close a tab by id.
    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Open a new tab at the URL. Restoration is strictly additive; the
    /// closed tab is never reused.
    async fn open_tab(&self, url: &str) -> Result<TabInfo, HostError>;
}
