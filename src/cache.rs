//! In-memory TTL cache for provider results and merged final responses.
//!
//! Entries are typed: a key in the provider namespace always holds a
//! `ProviderResult`, a key in the final namespace always holds a
//! `FinalResult`. No ad hoc JSON-or-string fallback on read. Stale entries
//! are evicted lazily on read; there is no background sweep, and nothing is
//! persisted across restarts.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::aggregate::FinalResult;
use crate::dispatch::ProviderResult;
use crate::providers::ProviderId;

/// Which bucket a key lives in: one per provider plus one for merged final
/// answers, with its own independent TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheNamespace {
    Provider(ProviderId),
    Final,
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheNamespace::Provider(id) => f.write_str(id.as_str()),
            CacheNamespace::Final => f.write_str("final"),
        }
    }
}

/// Strongly-typed cache key: namespace plus a hash of the normalized query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub namespace: CacheNamespace,
    pub query_hash: String,
}

impl CacheKey {
    pub fn provider(id: ProviderId, query: &str) -> Self {
        Self {
            namespace: CacheNamespace::Provider(id),
            query_hash: hash_string(&normalize_query(query)),
        }
    }

    pub fn final_response(query: &str) -> Self {
        Self {
            namespace: CacheNamespace::Final,
            query_hash: hash_string(&normalize_query(query)),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.query_hash)
    }
}

/// Lowercase, trim, and collapse whitespace so equivalent queries share a
/// cache entry.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    // First 16 hex chars are plenty for a per-process cache key.
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Tagged union of everything the cache can hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CachedValue {
    Provider(ProviderResult),
    Final(FinalResult),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Diagnostic snapshot of the cache, exposed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub cache_enabled: bool,
    pub cache_size: usize,
    pub cache_keys: Vec<String>,
}

/// Concurrency-safe result cache. Get/set are atomic per key; concurrent
/// writers race with last-writer-wins, which is fine because entries are
/// idempotent recomputations.
pub struct ResultCache {
    enabled: bool,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ResultCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Retrieves a live entry, evicting it if stale. A zero or negative TTL
    /// bucket is never read.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        if !self.enabled {
            return None;
        }
        let now = Utc::now();

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    debug!(key = %key, "Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Entry exists but is stale; take the write lock to evict it.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
            debug!(key = %key, "Evicting stale cache entry");
            entries.remove(key);
        }
        None
    }

    /// Stores a value with the bucket's TTL. Disabled caches and zero TTLs
    /// skip the write entirely.
    pub async fn put(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        if !self.enabled || ttl <= Duration::zero() {
            return;
        }
        let now = Utc::now();
        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at: now + ttl,
        };
        debug!(key = %key, created_at = %entry.created_at, "Cache store");
        self.entries.write().await.insert(key, entry);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let mut cache_keys: Vec<String> = entries.keys().map(|k| k.to_string()).collect();
        cache_keys.sort();
        CacheStats {
            cache_enabled: self.enabled,
            cache_size: entries.len(),
            cache_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ResultStatus;
    use crate::providers::ProviderContent;

    fn sample_result() -> ProviderResult {
        ProviderResult {
            provider: ProviderId::Market,
            status: ResultStatus::Success,
            content: ProviderContent::Text("AAPL trades at 198.42".into()),
            sources: Vec::new(),
            raw: None,
        }
    }

    #[tokio::test]
    async fn round_trips_a_provider_result() {
        let cache = ResultCache::new(true);
        let key = CacheKey::provider(ProviderId::Market, "AAPL price");
        cache
            .put(key.clone(), CachedValue::Provider(sample_result()), Duration::seconds(60))
            .await;

        match cache.get(&key).await {
            Some(CachedValue::Provider(result)) => {
                assert_eq!(result.provider, ProviderId::Market);
            }
            other => panic!("unexpected cache value: {other:?}"),
        }
    }

    #[tokio::test]
    async fn equivalent_queries_share_a_key() {
        assert_eq!(
            CacheKey::provider(ProviderId::Market, "  AAPL   Price "),
            CacheKey::provider(ProviderId::Market, "aapl price"),
        );
        assert_ne!(
            CacheKey::provider(ProviderId::Market, "aapl price"),
            CacheKey::provider(ProviderId::News, "aapl price"),
        );
    }

    #[tokio::test]
    async fn stale_entries_are_evicted_on_read() {
        let cache = ResultCache::new(true);
        let key = CacheKey::provider(ProviderId::Market, "AAPL price");
        cache
            .put(
                key.clone(),
                CachedValue::Provider(sample_result()),
                Duration::milliseconds(10),
            )
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.stats().await.cache_size, 0);
    }

    #[tokio::test]
    async fn zero_ttl_never_writes() {
        let cache = ResultCache::new(true);
        let key = CacheKey::provider(ProviderId::Notify, "send snapshot");
        cache
            .put(key.clone(), CachedValue::Provider(sample_result()), Duration::zero())
            .await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_is_inert() {
        let cache = ResultCache::new(false);
        let key = CacheKey::provider(ProviderId::Market, "AAPL price");
        cache
            .put(key.clone(), CachedValue::Provider(sample_result()), Duration::seconds(60))
            .await;
        assert!(cache.get(&key).await.is_none());

        let stats = cache.stats().await;
        assert!(!stats.cache_enabled);
        assert_eq!(stats.cache_size, 0);
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = ResultCache::new(true);
        let key = CacheKey::final_response("hello");
        cache
            .put(
                key.clone(),
                CachedValue::Final(FinalResult {
                    response: "hi".into(),
                    sources: Vec::new(),
                }),
                Duration::seconds(60),
            )
            .await;
        assert_eq!(cache.stats().await.cache_size, 1);

        cache.clear().await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.stats().await.cache_size, 0);
    }
}
