use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tabsweep_core::policy::minutes_to_ms;
use tabsweep_core::protocol::{TabId, TabInfo};
use tabsweep_core::sweep::UnknownTabPolicy;
use tabsweep_engine::clock::Clock;
use tabsweep_engine::host::{HostError, TabHost};
use tabsweep_engine::storage::{MemoryStorage, StorageArea, local_keys, sync_keys};
use tabsweep_engine::sweeper::Sweeper;
use tabsweep_engine::events::TabEvent;

const NOW: u64 = 1_700_000_000_000;

#[derive(Debug, Default)]
struct MockClock {
    now: AtomicU64,
}

impl MockClock {
    fn at(now: u64) -> Arc<Self> {
        let clock = Self::default();
        clock.now.store(now, Ordering::SeqCst);
        Arc::new(clock)
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct MockHost {
    tabs: Mutex<Vec<TabInfo>>,
    closed: Mutex<Vec<TabId>>,
    opened: Mutex<Vec<String>>,
    fail_close: Mutex<HashSet<TabId>>,
    fail_query: AtomicBool,
}

impl MockHost {
    fn with_tabs(tabs: Vec<TabInfo>) -> Arc<Self> {
        let host = Self::default();
        *host.tabs.lock().unwrap() = tabs;
        Arc::new(host)
    }

    fn closed(&self) -> Vec<TabId> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TabHost for MockHost {
    async fn query_tabs(&self) -> Result<Vec<TabInfo>, HostError> {
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(HostError::Io("query failed".into()));
        }
        Ok(self.tabs.lock().unwrap().clone())
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        if self.fail_close.lock().unwrap().contains(&tab_id) {
            return Err(HostError::TabNotFound(tab_id));
        }
        self.closed.lock().unwrap().push(tab_id);
        Ok(())
    }

    async fn open_tab(&self, url: &str) -> Result<TabInfo, HostError> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(TabInfo {
            id: Some(999),
            url: Some(url.to_string()),
            ..Default::default()
        })
    }
}

fn make_tab(id: TabId, url: &str) -> TabInfo {
    TabInfo {
        id: Some(id),
        url: Some(url.to_string()),
        title: Some(format!("Tab {id}")),
        ..Default::default()
    }
}

struct Fixture {
    host: Arc<MockHost>,
    sync: Arc<MemoryStorage>,
    local: Arc<MemoryStorage>,
    sweeper: Sweeper,
}

fn fixture(tabs: Vec<TabInfo>) -> Fixture {
    let host = MockHost::with_tabs(tabs);
    let sync = Arc::new(MemoryStorage::new());
    let local = Arc::new(MemoryStorage::new());
    let sweeper = Sweeper::new(host.clone(), sync.clone(), local.clone())
        .with_clock(MockClock::at(NOW));
    Fixture {
        host,
        sync,
        local,
        sweeper,
    }
}

async fn seed_activity(local: &MemoryStorage, stamps: &[(TabId, u64)]) {
    let map: serde_json::Map<String, serde_json::Value> = stamps
        .iter()
        .map(|(id, ms)| (id.to_string(), json!(ms)))
        .collect();
    local
        .seed(local_keys::TAB_ACTIVITY, serde_json::Value::Object(map))
        .await;
}

#[tokio::test]
async fn test_startup_seeds_open_tabs_and_normalizes_settings() {
    let f = fixture(vec![make_tab(1, "https://a.example"), make_tab(2, "https://b.example")]);
    f.sweeper.startup().await;

    assert_eq!(
        f.sync.get(sync_keys::TIMEOUT_MINUTES).await.unwrap(),
        Some(json!(30))
    );
    assert_eq!(
        f.sync.get(sync_keys::FULL_CLEANUP_ENABLED).await.unwrap(),
        Some(json!(true))
    );

    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert_eq!(activity["1"], json!(NOW));
    assert_eq!(activity["2"], json!(NOW));
}

#[tokio::test]
async fn test_sweep_closes_idle_tab_and_records_closure() {
    let f = fixture(vec![
        make_tab(1, "https://old.example.com"),
        make_tab(2, "https://fresh.example.com"),
    ]);
    seed_activity(
        &f.local,
        &[(1, NOW - minutes_to_ms(31)), (2, NOW - minutes_to_ms(5))],
    )
    .await;

    let report = f.sweeper.on_alarm("sweep").await.expect("sweep should run");

    assert_eq!(report.closed, vec![1]);
    assert_eq!(report.skipped, 1);
    assert_eq!(f.host.closed(), vec![1]);

    let history = f
        .local
        .get(local_keys::RECENTLY_REMOVED)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["url"], "https://old.example.com");
    assert_eq!(history[0]["reason"], "timeout");
    assert_eq!(history[0]["removedAt"], json!(NOW));

    let notifications = f
        .local
        .get(local_keys::TAB_REMOVED_NOTIFICATIONS)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notifications.as_array().unwrap().len(), 1);
    assert_eq!(notifications[0]["tabId"], json!(1));

    // Closed tab is forgotten; the fresh one keeps its stamp.
    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert!(activity.get("1").is_none());
    assert!(activity.get("2").is_some());
}

#[tokio::test]
async fn test_sweep_refreshes_exempt_tabs() {
    let mut pinned = make_tab(1, "https://pinned.example.com");
    pinned.pinned = true;
    let f = fixture(vec![pinned]);
    seed_activity(&f.local, &[(1, NOW - minutes_to_ms(100_000))]).await;

    let report = f.sweeper.sweep_now().await.unwrap();

    assert!(report.closed.is_empty());
    assert_eq!(report.refreshed, 1);
    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert_eq!(activity["1"], json!(NOW));
}

#[tokio::test]
async fn test_close_failure_is_swallowed_and_sweep_continues() {
    let f = fixture(vec![
        make_tab(1, "https://gone.example.com"),
        make_tab(2, "https://old.example.com"),
    ]);
    f.host.fail_close.lock().unwrap().insert(1);
    seed_activity(
        &f.local,
        &[(1, NOW - minutes_to_ms(31)), (2, NOW - minutes_to_ms(31))],
    )
    .await;

    let report = f.sweeper.sweep_now().await.unwrap();

    assert_eq!(report.failed, vec![1]);
    assert_eq!(report.closed, vec![2]);

    // The failed tab keeps its activity entry; its history entry is still
    // recorded (the close was decided and attempted).
    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert!(activity.get("1").is_some());
    assert!(activity.get("2").is_none());

    let history = f
        .local
        .get(local_keys::RECENTLY_REMOVED)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_query_failure_skips_cycle() {
    let f = fixture(vec![make_tab(1, "https://a.example")]);
    f.host.fail_query.store(true, Ordering::SeqCst);
    seed_activity(&f.local, &[(1, NOW - minutes_to_ms(500))]).await;

    let report = f.sweeper.sweep_now().await.unwrap();
    assert!(report.closed.is_empty());
    assert!(f.host.closed().is_empty());
}

#[tokio::test]
async fn test_unrelated_alarms_are_ignored() {
    let f = fixture(vec![make_tab(1, "https://a.example")]);
    seed_activity(&f.local, &[(1, NOW - minutes_to_ms(500))]).await;

    assert!(f.sweeper.on_alarm("heartbeat").await.is_none());
    assert!(f.host.closed().is_empty());
}

#[tokio::test]
async fn test_never_seen_tab_is_seeded_by_default() {
    let f = fixture(vec![make_tab(1, "https://new.example.com")]);

    let report = f.sweeper.sweep_now().await.unwrap();
    assert!(report.closed.is_empty());
    assert_eq!(report.seeded, 1);

    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert_eq!(activity["1"], json!(NOW));
}

#[tokio::test]
async fn test_never_seen_tab_closes_under_failsafe_policy() {
    let host = MockHost::with_tabs(vec![make_tab(1, "https://new.example.com")]);
    let sync = Arc::new(MemoryStorage::new());
    let local = Arc::new(MemoryStorage::new());
    let sweeper = Sweeper::new(host.clone(), sync, local.clone())
        .with_clock(MockClock::at(NOW))
        .with_unknown_tab_policy(UnknownTabPolicy::CloseImmediately);

    let report = sweeper.sweep_now().await.unwrap();
    assert_eq!(report.closed, vec![1]);

    let history = local
        .get(local_keys::RECENTLY_REMOVED)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(history[0]["reason"], "unknown");
}

#[tokio::test]
async fn test_events_update_persisted_activity() {
    let f = fixture(vec![]);

    f.sweeper.handle_event(TabEvent::Activated { tab_id: 7 }).await;
    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert_eq!(activity["7"], json!(NOW));

    // Updates to an inactive tab do not count as activity.
    f.sweeper
        .handle_event(TabEvent::Updated { tab_id: 8, active: false })
        .await;
    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert!(activity.get("8").is_none());

    f.sweeper
        .handle_event(TabEvent::Updated { tab_id: 8, active: true })
        .await;
    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert_eq!(activity["8"], json!(NOW));

    f.sweeper.handle_event(TabEvent::Removed { tab_id: 7 }).await;
    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert!(activity.get("7").is_none());
}

#[tokio::test]
async fn test_full_cleanup_closes_whitelisted_tab_end_to_end() {
    let f = fixture(vec![make_tab(1, "https://mail.example.com/inbox")]);
    f.sync
        .seed(sync_keys::WHITELIST, json!(["https://mail.example.com"]))
        .await;
    f.sync.seed(sync_keys::FULL_CLEANUP_MINUTES, json!(60)).await;
    seed_activity(&f.local, &[(1, NOW - minutes_to_ms(61))]).await;

    let report = f.sweeper.sweep_now().await.unwrap();
    assert_eq!(report.closed, vec![1]);

    let history = f
        .local
        .get(local_keys::RECENTLY_REMOVED)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(history[0]["reason"], "fullCleanup");
}

#[tokio::test]
async fn test_whitelist_protects_without_full_cleanup() {
    let f = fixture(vec![make_tab(1, "https://mail.example.com/inbox")]);
    f.sync
        .seed(sync_keys::WHITELIST, json!(["https://mail.example.com"]))
        .await;
    f.sync.seed(sync_keys::FULL_CLEANUP_ENABLED, json!(false)).await;
    seed_activity(&f.local, &[(1, NOW - minutes_to_ms(10_000))]).await;

    let report = f.sweeper.sweep_now().await.unwrap();
    assert!(report.closed.is_empty());
    assert_eq!(report.skipped, 1);
}

#[derive(Debug, Default)]
struct StalledHost {
    entered: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

#[async_trait]
impl TabHost for StalledHost {
    async fn query_tabs(&self) -> Result<Vec<TabInfo>, HostError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }

    async fn close_tab(&self, _tab_id: TabId) -> Result<(), HostError> {
        Ok(())
    }

    async fn open_tab(&self, _url: &str) -> Result<TabInfo, HostError> {
        Ok(TabInfo::default())
    }
}

#[tokio::test]
async fn test_overlapping_sweep_is_skipped() {
    let host = Arc::new(StalledHost::default());
    let sync = Arc::new(MemoryStorage::new());
    let local = Arc::new(MemoryStorage::new());
    let sweeper = Arc::new(
        Sweeper::new(host.clone(), sync, local).with_clock(MockClock::at(NOW)),
    );

    let first = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.sweep_now().await })
    };
    // Wait until the first sweep is genuinely in flight.
    host.entered.notified().await;

    assert!(sweeper.sweep_now().await.is_none());

    host.release.notify_one();
    assert!(first.await.unwrap().is_some());
}

#[tokio::test]
async fn test_run_dispatches_events_and_alarms() {
    let f = fixture(vec![make_tab(1, "https://old.example.com")]);
    seed_activity(&f.local, &[(1, NOW - minutes_to_ms(31))]).await;

    let (tab_tx, tab_rx) = tokio::sync::mpsc::channel(8);
    let (alarm_tx, alarm_rx) = tokio::sync::mpsc::channel(8);

    tab_tx.send(TabEvent::Activated { tab_id: 2 }).await.unwrap();
    alarm_tx.send("sweep".to_string()).await.unwrap();
    drop(tab_tx);
    drop(alarm_tx);

    f.sweeper.run(tab_rx, alarm_rx).await;

    assert_eq!(f.host.closed(), vec![1]);
    let activity = f.local.get(local_keys::TAB_ACTIVITY).await.unwrap().unwrap();
    assert_eq!(activity["2"], json!(NOW));
}
