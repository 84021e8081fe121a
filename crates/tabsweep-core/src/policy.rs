//! Settings normalization.
//!
//! Stored settings may be missing, partially set, or carry the wrong types
//! entirely; nothing here is allowed to fail because of that. [`resolve`]
//! turns whatever is persisted into an internally consistent [`Policy`], and
//! a sweep must never halt due to bad config.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_TIMEOUT_MINUTES: u64 = 30;
pub const DEFAULT_FULL_CLEANUP_MINUTES: u64 = 1440;
pub const MINUTES_PER_HOUR: u64 = 60;

const MS_PER_MINUTE: u64 = 60 * 1000;

/// Normalized sweep policy. Invariant after [`resolve`]:
/// `full_cleanup_minutes > timeout_minutes`, whatever was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub timeout_minutes: u64,
    pub full_cleanup_enabled: bool,
    pub full_cleanup_minutes: u64,
    pub whitelist: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            full_cleanup_enabled: true,
            full_cleanup_minutes: DEFAULT_FULL_CLEANUP_MINUTES,
            whitelist: Vec::new(),
        }
    }
}

impl Policy {
    pub fn timeout_ms(&self) -> u64 {
        minutes_to_ms(self.timeout_minutes)
    }

    pub fn full_cleanup_ms(&self) -> u64 {
        minutes_to_ms(self.full_cleanup_minutes)
    }
}

/// Resolve raw stored settings into a [`Policy`].
///
/// Idempotent: feeding a resolved policy back in yields the same policy.
/// `raw` is the JSON object read from the settings store; any other shape
/// resolves to all defaults.
pub fn resolve(raw: &Value) -> Policy {
    let timeout_minutes = normalize_minutes(raw.get("timeoutMinutes"), DEFAULT_TIMEOUT_MINUTES);

    let mut full_cleanup_minutes = normalize_minutes(
        raw.get("fullCleanupMinutes"),
        DEFAULT_FULL_CLEANUP_MINUTES,
    );
    if full_cleanup_minutes <= timeout_minutes {
        full_cleanup_minutes = timeout_minutes + 1;
    }

    Policy {
        timeout_minutes,
        full_cleanup_enabled: normalize_toggle(raw.get("fullCleanupEnabled")),
        full_cleanup_minutes,
        whitelist: normalize_whitelist(raw.get("whitelist")),
    }
}

/// A stored value counts as a minute setting when it is a finite number
/// >= 1 (numeric strings included, as the host storage layer historically
/// coerced them). It is floored; everything else yields the fallback.
fn normalize_minutes(value: Option<&Value>, fallback: u64) -> u64 {
    match value.and_then(as_finite_number) {
        Some(n) if n >= 1.0 => n.floor() as u64,
        _ => fallback,
    }
}

/// Default-on convention: only a stored literal `false` disables the toggle.
/// Absence or any other value means enabled, so pre-existing installations
/// that never stored the key keep the feature. This is a documented
/// compatibility choice, not strict validation.
fn normalize_toggle(value: Option<&Value>) -> bool {
    !matches!(value, Some(Value::Bool(false)))
}

fn normalize_whitelist(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn as_finite_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Minutes as milliseconds, clamped so zero or negative settings can never
/// produce an instant-close threshold.
pub fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.max(1).saturating_mul(MS_PER_MINUTE)
}

/// Conversion for hour-denominated UI inputs, rounded to 2 decimal places.
pub fn minutes_to_hours(minutes: u64) -> f64 {
    let hours = minutes as f64 / MINUTES_PER_HOUR as f64;
    (hours * 100.0).round() / 100.0
}

/// Hours back to whole minutes, flooring. Negative or non-finite input
/// saturates to 0 and is rejected by validation upstream.
pub fn hours_to_minutes(hours: f64) -> u64 {
    (hours * MINUTES_PER_HOUR as f64).floor() as u64
}

/// Prefix test against the stored whitelist entries, first match wins.
///
/// This is a plain `starts_with` on the raw strings, not a parsed-URL
/// match: an entry of `https://example.com` also matches
/// `https://example.com.evil.tld`. Callers relying on the whitelist for
/// anything security-sensitive should pad entries with a trailing slash.
pub fn whitelist_matches(url: &str, whitelist: &[String]) -> bool {
    whitelist.iter().any(|entry| url.starts_with(entry.as_str()))
}
