//! Time-bounded memoized store for recommendation results.
//!
//! Guarantees:
//! - no read ever returns a value past its `expires_at`;
//! - at most one computation proceeds per key at a time (single-flight):
//!   a concurrent second caller waits for the in-flight result and reuses it;
//! - compute failures are not cached, the next call retries from scratch;
//! - entries are replaced, never mutated in place.
//!
//! Eviction is lazy: expiry is checked on read, with an optional
//! `purge_expired` sweep for callers that want to bound memory.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use tutora_core::types::{Recommendation, SkillModule};

/// Cache key for recommendation results
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecommendationKey {
    pub user_id: String,
    pub module: Option<SkillModule>,
    pub limit: usize,
}

/// The cache used by the message router
pub type RecommendationCache = SingleFlightCache<RecommendationKey, Vec<Recommendation>>;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// TTL cache with a single-flight guarantee per key
#[derive(Debug)]
pub struct SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    entries: DashMap<K, CacheEntry<V>>,
    /// Per-key computation locks; a second caller parks here until the
    /// in-flight computation finishes
    flights: DashMap<K, Arc<Mutex<()>>>,
}

impl<K, V> Default for SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    /// Look up a fresh value without computing
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if entry.is_fresh() {
                return Some(entry.value.clone());
            }
        }
        // Lazy eviction; the guard above must be gone before taking the
        // shard's write lock
        self.entries.remove_if(key, |_, entry| !entry.is_fresh());
        None
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// Expired entries count as misses. Concurrent callers for the same key
    /// share one computation; a failed computation is not cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // Fast path, no lock
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let flight = self
            .flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = flight.lock().await;

        // A concurrent flight may have filled the entry while we waited
        if let Some(value) = self.get(&key) {
            drop(guard);
            drop(flight);
            self.release_flight(&key);
            return Ok(value);
        }

        let result = compute().await;
        if let Ok(ref value) = result {
            self.entries.insert(
                key.clone(),
                CacheEntry {
                    value: value.clone(),
                    expires_at: Utc::now() + ttl,
                },
            );
        } else {
            debug!("compute failed, leaving cache entry absent");
        }

        drop(guard);
        drop(flight);
        self.release_flight(&key);
        result
    }

    /// Drop the flight slot once no other caller holds it
    fn release_flight(&self, key: &K) {
        // The map itself holds one reference; more means active waiters
        self.flights
            .remove_if(key, |_, slot| Arc::strong_count(slot) <= 1);
    }

    /// Remove all expired entries; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh());
        before - self.entries.len()
    }

    /// Number of stored entries, fresh or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries matching a predicate on the key
    pub fn invalidate_where<P>(&self, mut predicate: P)
    where
        P: FnMut(&K) -> bool,
    {
        self.entries.retain(|key, _| !predicate(key));
    }
}

impl RecommendationCache {
    /// Drop every cached recommendation list for one user, e.g. when a new
    /// learning path supersedes their prior curriculum
    pub fn invalidate_user(&self, user_id: &str) {
        self.invalidate_where(|key| key.user_id == user_id);
    }
}
