//! Response cache with TTL expiry and LRU eviction.
//!
//! Read results are memoized under a content-addressed key: the hex SHA-256
//! digest of the namespace and the canonical JSON form of the request
//! parameters. Two parameter objects that are equal by value produce the same
//! key regardless of property order.
//!
//! Cache operations never fail. A poisoned lock or any other internal problem
//! behaves as a miss.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// Cache sizing and expiry settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when a caller does not override it.
    pub default_ttl: Duration,
    /// Maximum number of entries before LRU eviction.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    namespace: String,
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries dropped to respect the capacity bound.
    pub evictions: u64,
    /// Entries currently held, including expired ones not yet swept.
    pub entries: usize,
}

/// Bounded, TTL-expiring memoization of read results.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    /// Creates a cache from its configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl: config.default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Computes the lookup key for a namespace and parameter object.
    pub fn key(namespace: &str, params: &Value) -> String {
        let canonical = match params {
            Value::Null => "{}".to_string(),
            other => canonicalize(other).to_string(),
        };

        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns the cached value, or `None` if absent or expired.
    pub fn get(&self, namespace: &str, params: &Value) -> Option<Value> {
        let key = Self::key(namespace, params);
        let found = self.lookup(&key);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(namespace = namespace, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(namespace = namespace, "cache miss");
        }
        found
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().ok()?;
        let expired = entries.get(key)?.is_expired();
        if expired {
            entries.pop(key);
            return None;
        }
        entries.peek(key).map(|entry| entry.value.clone())
    }

    /// Stores a value with the override TTL, or the default when `None`.
    ///
    /// A zero TTL stores nothing and drops any existing entry for the key.
    pub fn set(&self, namespace: &str, params: &Value, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let key = Self::key(namespace, params);

        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!(namespace = namespace, "cache unavailable, skipping store");
            return;
        };

        if ttl.is_zero() {
            entries.pop(&key);
            return;
        }

        let entry = CacheEntry {
            namespace: namespace.to_string(),
            value,
            inserted_at: Instant::now(),
            ttl,
        };

        if let Some((evicted_key, _)) = entries.push(key.clone(), entry) {
            if evicted_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(namespace = namespace, "evicted least recently used entry");
            }
        }
    }

    /// Invalidates every entry, or only the entries of one namespace.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self, namespace: Option<&str>) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };

        match namespace {
            None => {
                let removed = entries.len();
                entries.clear();
                tracing::debug!(removed = removed, "cache cleared");
                removed
            }
            Some(ns) => {
                let keys: Vec<String> = entries
                    .iter()
                    .filter(|(_, entry)| entry.namespace == ns)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &keys {
                    entries.pop(key);
                }
                tracing::debug!(namespace = ns, removed = keys.len(), "cache namespace cleared");
                keys.len()
            }
        }
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// Rebuilds a JSON value with object keys in sorted order at every depth.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(max_entries: usize) -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            default_ttl: Duration::from_secs(60),
            max_entries,
        })
    }

    #[test]
    fn test_key_is_deterministic() {
        let params = json!({"mailbox": 1, "status": "active"});
        assert_eq!(
            ResponseCache::key("api:/conversations", &params),
            ResponseCache::key("api:/conversations", &params)
        );
    }

    #[test]
    fn test_key_ignores_property_order() {
        let mut a = serde_json::Map::new();
        a.insert("status".to_string(), json!("active"));
        a.insert("page".to_string(), json!({"size": 10, "number": 2}));
        let mut b = serde_json::Map::new();
        b.insert("page".to_string(), json!({"number": 2, "size": 10}));
        b.insert("status".to_string(), json!("active"));

        assert_eq!(
            ResponseCache::key("ns", &Value::Object(a)),
            ResponseCache::key("ns", &Value::Object(b))
        );
    }

    #[test]
    fn test_key_separates_namespaces_and_params() {
        let params = json!({"page": 1});
        assert_ne!(
            ResponseCache::key("api:/mailboxes", &params),
            ResponseCache::key("api:/conversations", &params)
        );
        assert_ne!(
            ResponseCache::key("ns", &json!({"page": 1})),
            ResponseCache::key("ns", &json!({"page": 2}))
        );
    }

    #[test]
    fn test_null_params_match_empty_object() {
        assert_eq!(
            ResponseCache::key("ns", &Value::Null),
            ResponseCache::key("ns", &json!({}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_not_returned_after_ttl() {
        let cache = cache(10);
        cache.set("ns", &json!({}), json!("value"), Some(Duration::from_secs(5)));
        assert_eq!(cache.get("ns", &json!({})), Some(json!("value")));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("ns", &json!({})), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies_without_override() {
        let cache = cache(10);
        cache.set("ns", &json!({}), json!(1), None);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("ns", &json!({})).is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("ns", &json!({})).is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_stores_nothing() {
        let cache = cache(10);
        cache.set("ns", &json!({}), json!(1), None);
        cache.set("ns", &json!({}), json!(2), Some(Duration::ZERO));
        assert_eq!(cache.get("ns", &json!({})), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = cache(3);
        cache.set("ns", &json!({"k": "a"}), json!("a"), None);
        cache.set("ns", &json!({"k": "b"}), json!("b"), None);
        cache.set("ns", &json!({"k": "c"}), json!("c"), None);

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("ns", &json!({"k": "a"})).is_some());
        cache.set("ns", &json!({"k": "d"}), json!("d"), None);

        assert_eq!(cache.len(), 3);
        assert!(cache.get("ns", &json!({"k": "b"})).is_none());
        assert!(cache.get("ns", &json!({"k": "a"})).is_some());
        assert!(cache.get("ns", &json!({"k": "c"})).is_some());
        assert!(cache.get("ns", &json!({"k": "d"})).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_is_not_an_eviction() {
        let cache = cache(2);
        cache.set("ns", &json!({}), json!(1), None);
        cache.set("ns", &json!({}), json!(2), None);
        assert_eq!(cache.get("ns", &json!({})), Some(json!(2)));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_clear_namespace_only_removes_that_namespace() {
        let cache = cache(10);
        cache.set("api:/conversations", &json!({"page": 1}), json!(1), None);
        cache.set("api:/conversations", &json!({"page": 2}), json!(2), None);
        cache.set("api:/mailboxes", &json!({}), json!(3), None);

        assert_eq!(cache.clear(Some("api:/conversations")), 2);
        assert!(cache.get("api:/conversations", &json!({"page": 1})).is_none());
        assert!(cache.get("api:/mailboxes", &json!({})).is_some());

        assert_eq!(cache.clear(None), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_stats_count_hits_and_misses() {
        let cache = cache(10);
        cache.set("ns", &json!({}), json!(1), None);
        cache.get("ns", &json!({}));
        cache.get("ns", &json!({"other": true}));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }
}
