//! The sweep decision engine.
//!
//! [`plan`] is a pure function of one tab snapshot, the resolved policy, the
//! activity table, and a single `now`. It produces a [`SweepPlan`] of
//! per-tab decisions and leaves all I/O (closing tabs, persisting state) to
//! the runtime, which keeps the decision table directly testable.
//!
//! Decisions are made per tab, order-independently; no tab's outcome can
//! influence another's.

use crate::activity::ActivityTracker;
use crate::policy::{self, Policy};
use crate::protocol::{EpochMillis, HistoryEntry, NotificationEntry, RemovalReason, TabId, TabInfo};
use serde::{Deserialize, Serialize};

/// What to do with a tab whose activity was never observed (restored from a
/// previous session, or tracker data lost).
///
/// Both behaviors shipped at different points in this project's history.
/// The lenient default avoids surprising the user by instantly closing tabs
/// the sweeper has only just discovered; the fail-safe variant prevents
/// zombie tabs that would otherwise never accrue an activity stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnknownTabPolicy {
    /// Stamp the tab with `now` and judge it on a later sweep.
    #[default]
    SeedAndDefer,
    /// Close it immediately with reason [`RemovalReason::Unknown`].
    CloseImmediately,
}

/// Why a tab was left alone this sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipCause {
    /// Missing id or URL: not enough information to judge the tab.
    InvalidTab,
    /// A whitelist prefix matched and full cleanup did not fire.
    Whitelisted,
    /// Still inside the normal timeout window.
    WithinTimeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedTab {
    pub tab_id: Option<TabId>,
    pub cause: SkipCause,
}

/// A decided closure, carrying everything the runtime needs: the records to
/// append and the tab to remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedClosure {
    pub tab_id: TabId,
    pub reason: RemovalReason,
    pub history: HistoryEntry,
    pub notification: NotificationEntry,
}

/// Outcome of planning one sweep over a tab snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepPlan {
    /// Active/audible/pinned tabs whose stamps move up to the sweep's `now`.
    pub refreshed: Vec<TabId>,
    /// Never-seen tabs granted a stamp under [`UnknownTabPolicy::SeedAndDefer`].
    pub seeded: Vec<TabId>,
    pub closures: Vec<PlannedClosure>,
    pub skipped: Vec<SkippedTab>,
}

impl SweepPlan {
    /// Fold the refresh and seed decisions into the tracker. Closure
    /// bookkeeping is deliberately not done here: the runtime forgets a tab
    /// only once the host confirms the close.
    pub fn stamp_activity(&self, activity: &mut ActivityTracker, now: EpochMillis) {
        for &tab_id in self.refreshed.iter().chain(self.seeded.iter()) {
            activity.record(tab_id, now);
        }
    }
}

/// Decide the fate of every tab in the snapshot.
pub fn plan(
    tabs: &[TabInfo],
    policy: &Policy,
    activity: &ActivityTracker,
    now: EpochMillis,
    unknown_tab: UnknownTabPolicy,
) -> SweepPlan {
    let timeout_ms = policy.timeout_ms();
    let full_cleanup_ms = policy.full_cleanup_ms();
    let mut plan = SweepPlan::default();

    for tab in tabs {
        let (Some(tab_id), Some(url)) = (tab.id, tab.url.as_deref()) else {
            plan.skipped.push(SkippedTab {
                tab_id: tab.id,
                cause: SkipCause::InvalidTab,
            });
            continue;
        };

        // Tabs the user is on, listening to, or has pinned are exempt
        // regardless of elapsed time, and count as fresh activity.
        if tab.active || tab.audible || tab.pinned {
            plan.refreshed.push(tab_id);
            continue;
        }

        let Some(last_activity) = activity.last_activity(tab_id) else {
            match unknown_tab {
                UnknownTabPolicy::SeedAndDefer => plan.seeded.push(tab_id),
                UnknownTabPolicy::CloseImmediately => {
                    plan.closures
                        .push(make_closure(tab, tab_id, url, RemovalReason::Unknown, now));
                }
            }
            continue;
        };

        let elapsed = now.saturating_sub(last_activity);

        // The hard ceiling exists precisely to reclaim tabs the whitelist
        // would otherwise keep alive forever, so it is checked first.
        let force_removal = policy.full_cleanup_enabled && elapsed >= full_cleanup_ms;

        if !force_removal && policy::whitelist_matches(url, &policy.whitelist) {
            plan.skipped.push(SkippedTab {
                tab_id: Some(tab_id),
                cause: SkipCause::Whitelisted,
            });
            continue;
        }

        if !force_removal && elapsed < timeout_ms {
            plan.skipped.push(SkippedTab {
                tab_id: Some(tab_id),
                cause: SkipCause::WithinTimeout,
            });
            continue;
        }

        let reason = if force_removal {
            RemovalReason::FullCleanup
        } else {
            RemovalReason::Timeout
        };
        plan.closures.push(make_closure(tab, tab_id, url, reason, now));
    }

    plan
}

fn make_closure(
    tab: &TabInfo,
    tab_id: TabId,
    url: &str,
    reason: RemovalReason,
    now: EpochMillis,
) -> PlannedClosure {
    PlannedClosure {
        tab_id,
        reason,
        history: HistoryEntry::for_tab(tab, url, reason, now),
        notification: NotificationEntry::for_tab(tab, tab_id, url, reason, now),
    }
}
