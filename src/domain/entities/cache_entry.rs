use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Memoized server response keyed by method + url, used by read paths to
/// fall back to last-known data while offline. Expiry is enforced when the
/// entry is read, not by a background timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub payload: serde_json::Value,
    pub cached_at: DateTime<Utc>,
    pub ttl_seconds: Option<i64>,
}

impl CacheEntry {
    pub fn key(method: &str, url: &str) -> String {
        format!("{} {}", method.to_uppercase(), url)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_seconds {
            Some(ttl) => now >= self.cached_at + Duration::seconds(ttl),
            None => false,
        }
    }
}
