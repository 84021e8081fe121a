//! Event surface of the runtime.
//!
//! The host's callback registrations (tab activated/updated/removed, alarm
//! fired) are represented as explicit message types consumed by one
//! dispatcher. That keeps the decision logic callback-free and makes the
//! whole control flow drivable from tests.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tabsweep_core::protocol::TabId;
use tokio::sync::mpsc;
use tracing::debug;

/// Name of the recurring sweep signal. Other alarm names are ignored.
pub const SWEEP_ALARM: &str = "sweep";

/// How often the sweep signal fires.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Tab lifecycle events forwarded from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TabEvent {
    /// The user switched to this tab.
    Activated { tab_id: TabId },
    /// The tab finished loading or otherwise changed; only updates to the
    /// active tab count as user activity.
    Updated { tab_id: TabId, active: bool },
    /// The tab was closed (by the user or anyone else).
    Removed { tab_id: TabId },
}

/// The periodic-trigger facility: fires a named signal on a fixed period
/// into a bounded channel.
///
/// The channel is bounded and ticks are dropped, not queued, when the
/// consumer is still busy with a previous sweep; together with the
/// dispatcher running on one task this is the overlapping-sweep guard.
#[derive(Debug, Clone)]
pub struct AlarmTicker {
    name: String,
    period: Duration,
}

impl AlarmTicker {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
        }
    }

    /// The sweeper's own schedule: `"sweep"` roughly once per minute.
    pub fn sweep() -> Self {
        Self::new(SWEEP_ALARM, SWEEP_PERIOD)
    }

    /// Spawn the ticker task. The first signal fires one full period after
    /// the call, then repeats until the receiver is dropped.
    pub fn spawn(self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.period;
            let mut interval = tokio::time::interval_at(start, self.period);
            loop {
                interval.tick().await;
                match tx.try_send(self.name.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(alarm = %self.name, "previous signal not consumed yet, dropping tick");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_on_period() {
        let mut rx = AlarmTicker::sweep().spawn();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(rx.recv().await.as_deref(), Some("sweep"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_drops_ticks_while_consumer_busy() {
        let mut rx = AlarmTicker::new("sweep", Duration::from_secs(60)).spawn();

        // Three periods pass without anyone consuming; the channel holds one
        // pending signal and the rest were dropped.
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(61)).await;
            tokio::task::yield_now().await;
        }

        assert_eq!(rx.recv().await.as_deref(), Some("sweep"));
        assert!(rx.try_recv().is_err());
    }
}
