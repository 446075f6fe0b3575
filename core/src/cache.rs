//! Response cache: keyed storage with hard expiry.
//!
//! # Design
//! The store is an explicit service injected into the client, never hidden
//! module state, so several clients can share one store and tests can start
//! from an empty one. Expiry uses `tokio::time::Instant`, which follows the
//! paused test clock. An entry is either fresh or gone: expired entries are
//! dropped on read and there is no background revalidation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::trace;

use crate::http::{HttpMethod, RequestBody};

/// How long a successful response is reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheFor {
    #[default]
    Disabled,
    /// Reuse for this long after the response arrives. A zero duration
    /// disables caching.
    Ttl(Duration),
    /// Reuse until this instant.
    ExpireAt(Instant),
    /// Reuse until explicitly invalidated.
    Forever,
}

impl CacheFor {
    pub fn millis(ms: u64) -> Self {
        CacheFor::Ttl(Duration::from_millis(ms))
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            CacheFor::Disabled => false,
            CacheFor::Ttl(d) => !d.is_zero(),
            CacheFor::ExpireAt(_) | CacheFor::Forever => true,
        }
    }

    /// The entry's expiry when stored at `now`. `None` means nothing should
    /// be stored; `Some(None)` means the entry never expires.
    pub fn deadline(&self, now: Instant) -> Option<Option<Instant>> {
        match *self {
            CacheFor::Disabled => None,
            CacheFor::Ttl(d) if d.is_zero() => None,
            CacheFor::Ttl(d) => Some(Some(now + d)),
            CacheFor::ExpireAt(at) if at <= now => None,
            CacheFor::ExpireAt(at) => Some(Some(at)),
            CacheFor::Forever => Some(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Storage backing the cache layer.
pub trait CacheStore: Send + Sync {
    /// The value under `key` if it has not expired.
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, entry: CacheEntry);
    fn remove(&self, key: &str);
    fn clear(&self);
    /// Number of stored entries, expired ones included until they are read.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries();
        let fresh = entries.get(key)?.is_fresh(Instant::now());
        if fresh {
            return entries.get(key).map(|e| e.value.clone());
        }
        trace!(key, "cache entry expired");
        entries.remove(key);
        None
    }

    fn set(&self, entry: CacheEntry) {
        self.entries().insert(entry.key.clone(), entry);
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }

    fn clear(&self) {
        self.entries().clear();
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Cache identity of a request: verb, url without query, params, and the
/// body (JSON and text as is, binary and multipart as a digest).
pub fn cache_key(
    method: HttpMethod,
    url: &str,
    params: &BTreeMap<String, String>,
    body: &RequestBody,
) -> String {
    json!([method.as_str(), url, params, body.cache_fragment()]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: Value, expires_at: Option<Instant>) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value,
            expires_at,
        }
    }

    #[test]
    fn zero_ttl_disables_caching() {
        assert!(!CacheFor::Ttl(Duration::ZERO).is_enabled());
        assert!(!CacheFor::Disabled.is_enabled());
        assert!(CacheFor::millis(1).is_enabled());
        assert!(CacheFor::Forever.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_per_policy() {
        let now = Instant::now();
        assert_eq!(CacheFor::Disabled.deadline(now), None);
        assert_eq!(CacheFor::millis(10).deadline(now), Some(Some(now + Duration::from_millis(10))));
        assert_eq!(CacheFor::Forever.deadline(now), Some(None));
        assert_eq!(CacheFor::ExpireAt(now).deadline(now), None);
        let later = now + Duration::from_secs(1);
        assert_eq!(CacheFor::ExpireAt(later).deadline(now), Some(Some(later)));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_at_the_deadline() {
        let cache = MemoryCache::new();
        let deadline = Instant::now() + Duration::from_millis(100);
        cache.set(entry("k", json!(1), Some(deadline)));

        tokio::time::advance(Duration::from_millis(99)).await;
        assert_eq!(cache.get("k"), Some(json!(1)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty(), "expired entry is dropped on read");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_without_deadline_live_until_removed() {
        let cache = MemoryCache::new();
        cache.set(entry("a", json!("x"), None));
        cache.set(entry("b", json!("y"), None));
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(cache.get("a"), Some(json!("x")));

        cache.remove("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn key_depends_on_method_url_params_and_body() {
        let mut params = BTreeMap::new();
        params.insert("page".to_string(), "1".to_string());
        let base = cache_key(HttpMethod::Get, "/list", &params, &RequestBody::Empty);

        assert_eq!(base, cache_key(HttpMethod::Get, "/list", &params, &RequestBody::Empty));
        assert_ne!(base, cache_key(HttpMethod::Post, "/list", &params, &RequestBody::Empty));
        assert_ne!(base, cache_key(HttpMethod::Get, "/other", &params, &RequestBody::Empty));
        assert_ne!(base, cache_key(HttpMethod::Get, "/list", &BTreeMap::new(), &RequestBody::Empty));
        assert_ne!(
            base,
            cache_key(HttpMethod::Get, "/list", &params, &RequestBody::Json(json!({"a": 1})))
        );
    }
}
