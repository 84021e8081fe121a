//! Operations on the stored settings record.
//!
//! Everything the settings/popup surfaces do to storage happens here, behind
//! the UI-free seam: loading the normalized policy, the startup write-back of
//! defaults, the hour-denominated save path with its validation, and the
//! ordered whitelist edits.

use crate::storage::{StorageArea, StorageError, local_keys, sync_keys};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabsweep_core::policy::{self, MINUTES_PER_HOUR, Policy};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("timeout must be at least 1 minute")]
    TimeoutTooSmall,

    #[error("full cleanup timer must be a number")]
    FullCleanupNotANumber,

    #[error("full cleanup timer must be at least one hour")]
    FullCleanupTooShort,

    #[error("full cleanup timer must be longer than the normal timeout")]
    FullCleanupNotAboveTimeout,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

const POLICY_KEYS: [&str; 4] = [
    sync_keys::TIMEOUT_MINUTES,
    sync_keys::FULL_CLEANUP_MINUTES,
    sync_keys::FULL_CLEANUP_ENABLED,
    sync_keys::WHITELIST,
];

/// Read and normalize the stored settings. Never fails: an unreadable key is
/// treated as absent and resolves to its default, so a sweep cannot be
/// halted by bad config or a flaky settings store.
pub async fn load_policy(sync: &dyn StorageArea) -> Policy {
    let mut raw = Map::new();
    for key in POLICY_KEYS {
        match sync.get(key).await {
            Ok(Some(value)) => {
                raw.insert(key.to_string(), value);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(key, error = %err, "settings read failed, falling back to default");
            }
        }
    }
    policy::resolve(&Value::Object(raw))
}

/// Startup normalization: resolve whatever is stored and write back only the
/// keys whose normalized value differs, so a fresh install ends up with
/// explicit defaults and a corrupted record heals itself.
pub async fn ensure_defaults(sync: &dyn StorageArea) -> Result<(), StorageError> {
    let stored_timeout = sync.get(sync_keys::TIMEOUT_MINUTES).await?;
    let stored_minutes = sync.get(sync_keys::FULL_CLEANUP_MINUTES).await?;
    let stored_enabled = sync.get(sync_keys::FULL_CLEANUP_ENABLED).await?;

    let mut raw = Map::new();
    for (key, value) in [
        (sync_keys::TIMEOUT_MINUTES, &stored_timeout),
        (sync_keys::FULL_CLEANUP_MINUTES, &stored_minutes),
        (sync_keys::FULL_CLEANUP_ENABLED, &stored_enabled),
    ] {
        if let Some(value) = value {
            raw.insert(key.to_string(), value.clone());
        }
    }
    let resolved = policy::resolve(&Value::Object(raw));

    let updates = [
        (
            sync_keys::TIMEOUT_MINUTES,
            stored_timeout,
            Value::from(resolved.timeout_minutes),
        ),
        (
            sync_keys::FULL_CLEANUP_MINUTES,
            stored_minutes,
            Value::from(resolved.full_cleanup_minutes),
        ),
        (
            sync_keys::FULL_CLEANUP_ENABLED,
            stored_enabled,
            Value::from(resolved.full_cleanup_enabled),
        ),
    ];
    for (key, stored, normalized) in updates {
        if stored.as_ref() != Some(&normalized) {
            sync.set(key, normalized).await?;
        }
    }
    Ok(())
}

/// One save action from a settings surface. Timer fields are what the form
/// actually carries: minutes for the normal timeout, hours for the full
/// cleanup ceiling. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub timeout_minutes: Option<f64>,
    pub full_cleanup_hours: Option<f64>,
    pub full_cleanup_enabled: bool,
}

/// Validate and persist a settings update.
///
/// Turning the toggle off stores only `fullCleanupEnabled: false`; the
/// stored minutes survive so re-enabling restores the previous ceiling.
pub async fn apply_update(
    sync: &dyn StorageArea,
    update: &SettingsUpdate,
) -> Result<(), SettingsError> {
    let timeout_minutes = match update.timeout_minutes {
        Some(v) if v.is_finite() && v >= 1.0 => Some(v.floor() as u64),
        Some(_) => return Err(SettingsError::TimeoutTooSmall),
        None => None,
    };

    let mut writes: Vec<(&str, Value)> = Vec::new();
    if let Some(minutes) = timeout_minutes {
        writes.push((sync_keys::TIMEOUT_MINUTES, Value::from(minutes)));
    }

    if update.full_cleanup_enabled {
        if let Some(hours) = update.full_cleanup_hours {
            if !hours.is_finite() || hours < 0.1 {
                return Err(SettingsError::FullCleanupNotANumber);
            }
            let minutes = policy::hours_to_minutes(hours);
            if minutes < MINUTES_PER_HOUR {
                return Err(SettingsError::FullCleanupTooShort);
            }
            let effective_timeout = match timeout_minutes {
                Some(t) => t,
                None => load_policy(sync).await.timeout_minutes,
            };
            if effective_timeout >= minutes {
                return Err(SettingsError::FullCleanupNotAboveTimeout);
            }
            writes.push((sync_keys::FULL_CLEANUP_MINUTES, Value::from(minutes)));
        }
        writes.push((sync_keys::FULL_CLEANUP_ENABLED, Value::from(true)));
    } else {
        writes.push((sync_keys::FULL_CLEANUP_ENABLED, Value::from(false)));
    }

    for (key, value) in writes {
        sync.set(key, value).await?;
    }
    Ok(())
}

async fn read_whitelist(sync: &dyn StorageArea) -> Result<Vec<String>, StorageError> {
    Ok(match sync.get(sync_keys::WHITELIST).await? {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    })
}

async fn write_whitelist(
    sync: &dyn StorageArea,
    list: &[String],
) -> Result<(), StorageError> {
    sync.set(sync_keys::WHITELIST, serde_json::to_value(list)?)
        .await
}

/// Append a URL prefix to the whitelist, preserving insertion order.
/// Blank input is skipped.
pub async fn whitelist_add(
    sync: &dyn StorageArea,
    url: &str,
) -> Result<Vec<String>, StorageError> {
    let url = url.trim();
    let mut list = read_whitelist(sync).await?;
    if !url.is_empty() {
        list.push(url.to_string());
        write_whitelist(sync, &list).await?;
    }
    Ok(list)
}

/// Remove the whitelist entry at `index`; past-the-end is a no-op. Positions
/// shift down afterwards, which is why edits are serialized in-process.
pub async fn whitelist_remove(
    sync: &dyn StorageArea,
    index: usize,
) -> Result<Vec<String>, StorageError> {
    let mut list = read_whitelist(sync).await?;
    if index < list.len() {
        list.remove(index);
        write_whitelist(sync, &list).await?;
    }
    Ok(list)
}

/// Empty the closure history.
pub async fn history_clear(local: &dyn StorageArea) -> Result<(), StorageError> {
    local
        .set(local_keys::RECENTLY_REMOVED, Value::Array(Vec::new()))
        .await
}
