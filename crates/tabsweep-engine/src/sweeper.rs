//! Runtime orchestration around the pure sweep planner.
//!
//! One `Sweeper` owns the activity table and talks to the collaborators:
//! the settings and local storage areas, the tab host, and the clock. Event
//! handlers and the alarm handler are ordinary async methods; the host (or
//! [`Sweeper::run`]) feeds them messages. Nothing here is allowed to take
//! the process down: per-tab failures are swallowed, storage failures
//! degrade to in-memory state for the cycle.

use crate::clock::{Clock, SystemClock};
use crate::events::{SWEEP_ALARM, TabEvent};
use crate::host::{HostError, TabHost};
use crate::settings;
use crate::storage::{StorageArea, StorageError, local_keys};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tabsweep_core::activity::ActivityTracker;
use tabsweep_core::history::HistoryLog;
use tabsweep_core::notify::NotificationQueue;
use tabsweep_core::protocol::{HistoryEntry, NotificationEntry, TabId};
use tabsweep_core::sweep::{self, UnknownTabPolicy};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Ceiling on any single host call. A stuck collaborator degrades to a
/// per-tab failure instead of stalling the sweep forever.
const HOST_CALL_TIMEOUT: Duration = Duration::from_secs(10);

async fn bounded<T>(call: impl Future<Output = Result<T, HostError>>) -> Result<T, HostError> {
    tokio::time::timeout(HOST_CALL_TIMEOUT, call)
        .await
        .unwrap_or(Err(HostError::Timeout))
}

#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// What one sweep actually did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub closed: Vec<TabId>,
    /// Tabs a close was attempted for but the host refused (already gone,
    /// usually). Their history entries are still recorded.
    pub failed: Vec<TabId>,
    pub refreshed: usize,
    pub seeded: usize,
    pub skipped: usize,
}

pub struct Sweeper {
    host: Arc<dyn TabHost>,
    sync: Arc<dyn StorageArea>,
    local: Arc<dyn StorageArea>,
    clock: Arc<dyn Clock>,
    activity: Mutex<ActivityTracker>,
    unknown_tab: UnknownTabPolicy,
    // Overlapping-invocation guard: a tick arriving while a slow sweep is
    // still in flight is skipped, not queued.
    sweeping: AtomicBool,
}

impl Sweeper {
    pub fn new(
        host: Arc<dyn TabHost>,
        sync: Arc<dyn StorageArea>,
        local: Arc<dyn StorageArea>,
    ) -> Self {
        Self {
            host,
            sync,
            local,
            clock: Arc::new(SystemClock),
            activity: Mutex::new(ActivityTracker::new()),
            unknown_tab: UnknownTabPolicy::default(),
            sweeping: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_unknown_tab_policy(mut self, policy: UnknownTabPolicy) -> Self {
        self.unknown_tab = policy;
        self
    }

    /// Process-start sequence: normalize stored settings, restore the
    /// persisted activity table, then stamp every open tab with one shared
    /// base instant so pre-existing tabs are not judged "never active".
    pub async fn startup(&self) {
        if let Err(err) = settings::ensure_defaults(self.sync.as_ref()).await {
            warn!(error = %err, "settings normalization failed at startup");
        }
        self.reload_activity().await;

        match bounded(self.host.query_tabs()).await {
            Ok(tabs) => {
                let now = self.clock.now_ms();
                let mut activity = self.activity.lock().await;
                activity.seed_all(&tabs, now);
                info!(tabs = tabs.len(), "seeded activity for open tabs");
            }
            Err(err) => {
                warn!(error = %err, "tab query failed at startup, skipping seed");
            }
        }
        self.persist_activity().await;
    }

    /// Dispatch one tab lifecycle event.
    pub async fn handle_event(&self, event: TabEvent) {
        match event {
            TabEvent::Activated { tab_id } => {
                self.activity.lock().await.record(tab_id, self.clock.now_ms());
                self.persist_activity().await;
            }
            TabEvent::Updated { tab_id, active } => {
                // Only the active tab's updates count as user activity.
                if active {
                    self.activity.lock().await.record(tab_id, self.clock.now_ms());
                    self.persist_activity().await;
                }
            }
            TabEvent::Removed { tab_id } => {
                self.activity.lock().await.forget(tab_id);
                self.persist_activity().await;
            }
        }
    }

    /// Periodic-trigger entry point. Signals other than [`SWEEP_ALARM`] are
    /// ignored; a tick landing while a sweep is in flight is skipped.
    pub async fn on_alarm(&self, name: &str) -> Option<SweepReport> {
        if name != SWEEP_ALARM {
            debug!(alarm = name, "ignoring unrelated alarm");
            return None;
        }
        self.sweep_now().await
    }

    /// Run one guarded sweep. Returns `None` when another sweep was already
    /// in flight.
    pub async fn sweep_now(&self) -> Option<SweepReport> {
        if self.sweeping.swap(true, Ordering::SeqCst) {
            warn!("sweep already in flight, skipping this tick");
            return None;
        }
        let report = self.sweep().await;
        self.sweeping.store(false, Ordering::SeqCst);
        Some(report)
    }

    /// Consume tab events and alarm signals until both channels close.
    pub async fn run(
        &self,
        mut tab_events: mpsc::Receiver<TabEvent>,
        mut alarms: mpsc::Receiver<String>,
    ) {
        loop {
            tokio::select! {
                Some(event) = tab_events.recv() => {
                    self.handle_event(event).await;
                }
                Some(name) = alarms.recv() => {
                    self.on_alarm(&name).await;
                }
                else => break,
            }
        }
    }

    async fn sweep(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let policy = settings::load_policy(self.sync.as_ref()).await;
        debug!(
            timeout_minutes = policy.timeout_minutes,
            full_cleanup_minutes = policy.full_cleanup_minutes,
            full_cleanup_enabled = policy.full_cleanup_enabled,
            "sweep triggered"
        );

        // Pick up whatever was last persisted (another process instance may
        // have run in between); a failed read keeps the in-memory table.
        self.reload_activity().await;

        let tabs = match bounded(self.host.query_tabs()).await {
            Ok(tabs) => tabs,
            Err(err) => {
                warn!(error = %err, "tab query failed, skipping this sweep");
                return SweepReport::default();
            }
        };

        let plan = {
            let activity = self.activity.lock().await;
            sweep::plan(&tabs, &policy, &activity, now, self.unknown_tab)
        };
        for skip in &plan.skipped {
            debug!(tab_id = ?skip.tab_id, cause = ?skip.cause, "keeping tab");
        }

        let mut report = SweepReport {
            refreshed: plan.refreshed.len(),
            seeded: plan.seeded.len(),
            skipped: plan.skipped.len(),
            ..SweepReport::default()
        };

        // Closure records go in before the close attempt; a tab that turns
        // out to be already gone keeps its history entry.
        let (mut history, mut queue, records_loaded) = match self.load_closure_records().await {
            Ok((history, queue)) => (history, queue, true),
            Err(err) => {
                warn!(error = %err, "closure records unreadable, closing without logging this cycle");
                (HistoryLog::new(), NotificationQueue::new(), false)
            }
        };

        for closure in &plan.closures {
            history.push(closure.history.clone());
            queue.push(closure.notification.clone());

            match bounded(self.host.close_tab(closure.tab_id)).await {
                Ok(()) => {
                    info!(
                        tab_id = closure.tab_id,
                        reason = %closure.reason,
                        url = %closure.history.url,
                        "closed idle tab"
                    );
                    report.closed.push(closure.tab_id);
                }
                Err(err) => {
                    // Best-effort: the user may have closed it first.
                    warn!(tab_id = closure.tab_id, error = %err, "tab close failed, continuing sweep");
                    report.failed.push(closure.tab_id);
                }
            }
        }

        // Activity mutation and persistence happen once, after all per-tab
        // decisions, so concurrent event stamps are not lost piecemeal.
        {
            let mut activity = self.activity.lock().await;
            plan.stamp_activity(&mut activity, now);
            for &tab_id in &report.closed {
                activity.forget(tab_id);
            }
        }

        if records_loaded && !plan.closures.is_empty() {
            self.persist_closure_records(&history, &queue).await;
        }
        self.persist_activity().await;

        report
    }

    /// Restore the history entry at `index`: open a fresh tab at its URL and
    /// drop exactly that entry. An out-of-range index is a no-op. The entry
    /// stays put if the host refuses to open the tab.
    pub async fn restore(&self, index: usize) -> Result<Option<HistoryEntry>, SweeperError> {
        let stored = self.local.get(local_keys::RECENTLY_REMOVED).await?;
        let mut log = HistoryLog::from_value(stored.as_ref());

        let Some(entry) = log.get(index).cloned() else {
            return Ok(None);
        };
        bounded(self.host.open_tab(&entry.url)).await?;

        log.take(index);
        self.local
            .set(local_keys::RECENTLY_REMOVED, log.to_value())
            .await?;
        info!(url = %entry.url, "restored closed tab");
        Ok(Some(entry))
    }

    /// Drop all closure history.
    pub async fn clear_history(&self) -> Result<(), StorageError> {
        settings::history_clear(self.local.as_ref()).await
    }

    /// Notifications recorded since the last check. Advances the check
    /// cursor to now and prunes entries that can never be shown again.
    pub async fn unseen_notifications(&self) -> Result<Vec<NotificationEntry>, StorageError> {
        let stored = self.local.get(local_keys::TAB_REMOVED_NOTIFICATIONS).await?;
        let mut queue = NotificationQueue::from_value(stored.as_ref());
        let last_check = self
            .local
            .get(local_keys::LAST_NOTIFICATION_CHECK)
            .await?
            .and_then(|value| value.as_u64())
            .unwrap_or(0);

        let unseen = queue.unseen_since(last_check);
        queue.prune_seen(last_check);

        self.local
            .set(local_keys::TAB_REMOVED_NOTIFICATIONS, queue.to_value())
            .await?;
        self.local
            .set(
                local_keys::LAST_NOTIFICATION_CHECK,
                Value::from(self.clock.now_ms()),
            )
            .await?;
        Ok(unseen)
    }

    async fn reload_activity(&self) {
        match self.local.get(local_keys::TAB_ACTIVITY).await {
            Ok(value) => {
                *self.activity.lock().await = ActivityTracker::from_value(value.as_ref());
            }
            Err(err) => {
                warn!(error = %err, "activity load failed, keeping in-memory table");
            }
        }
    }

    async fn persist_activity(&self) {
        let value = self.activity.lock().await.to_value();
        if let Err(err) = self.local.set(local_keys::TAB_ACTIVITY, value).await {
            // Degraded but not fatal: the next restart may re-grant a grace
            // period to tabs whose stamps were lost.
            warn!(error = %err, "activity persist failed");
        }
    }

    async fn load_closure_records(
        &self,
    ) -> Result<(HistoryLog, NotificationQueue), StorageError> {
        let history = self.local.get(local_keys::RECENTLY_REMOVED).await?;
        let notifications = self.local.get(local_keys::TAB_REMOVED_NOTIFICATIONS).await?;
        Ok((
            HistoryLog::from_value(history.as_ref()),
            NotificationQueue::from_value(notifications.as_ref()),
        ))
    }

    async fn persist_closure_records(&self, history: &HistoryLog, queue: &NotificationQueue) {
        if let Err(err) = self
            .local
            .set(local_keys::RECENTLY_REMOVED, history.to_value())
            .await
        {
            warn!(error = %err, "history persist failed");
        }
        if let Err(err) = self
            .local
            .set(local_keys::TAB_REMOVED_NOTIFICATIONS, queue.to_value())
            .await
        {
            warn!(error = %err, "notification persist failed");
        }
    }
}
