use dashmap::{mapref::entry::Entry, DashMap};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::{
    error::{AppError, AppResult},
    models::{CacheKey, ProductId, RecommendationRequest, RecommendationResult, Strategy, UserId},
    services::engine::Recommender,
};

type Outcome = AppResult<RecommendationResult>;

/// Capacity and TTLs for the recommendation cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Maximum number of cached results before LRU eviction
    pub capacity: usize,
    /// TTL for `popular` results
    pub popular_ttl: Duration,
    /// TTL for `forYou` and `similar` results
    pub personal_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            popular_ttl: Duration::from_secs(3600),
            personal_ttl: Duration::from_secs(600),
        }
    }
}

impl CacheSettings {
    pub fn ttl_for(&self, strategy: Strategy) -> Duration {
        match strategy {
            Strategy::Popular => self.popular_ttl,
            Strategy::ForYou | Strategy::Similar => self.personal_ttl,
        }
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Requests that waited on another caller's in-flight compute
    pub joins: u64,
    pub computes: u64,
    pub failures: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
    computes: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct CacheEntry {
    value: RecommendationResult,
    computed_at: Instant,
    expires_at: Instant,
}

struct Inner {
    /// Computed results, bounded and ordered by recency of use
    ready: Mutex<LruCache<CacheKey, CacheEntry>>,
    /// Computes in flight; late arrivals subscribe to their outcome
    pending: DashMap<CacheKey, watch::Receiver<Option<Outcome>>>,
    settings: CacheSettings,
    counters: Counters,
}

impl Inner {
    /// Returns a fresh result for `key`, dropping it if expired
    fn lookup(&self, key: CacheKey) -> Option<RecommendationResult> {
        let now = Instant::now();
        let mut ready = self.ready.lock();

        if let Some(entry) = ready.get(&key) {
            if entry.expires_at > now {
                Counters::bump(&self.counters.hits);
                tracing::debug!(
                    key = %key,
                    age_ms = now.duration_since(entry.computed_at).as_millis() as u64,
                    "Cache hit"
                );
                return Some(entry.value.clone());
            }
            ready.pop(&key);
            tracing::debug!(key = %key, "Cache entry expired");
        }
        None
    }

    /// Records a finished compute: success becomes an entry, failure leaves none
    ///
    /// The entry is stored before the pending slot is released, so a lookup
    /// that finds no pending slot finds the entry.
    fn settle(&self, key: CacheKey, outcome: &Outcome) {
        match outcome {
            Ok(value) => {
                let now = Instant::now();
                let ttl = self.settings.ttl_for(key.strategy);
                let entry = CacheEntry {
                    value: value.clone(),
                    computed_at: now,
                    expires_at: now + ttl,
                };

                let evicted = self.ready.lock().push(key, entry);
                if let Some((evicted_key, _)) = evicted.filter(|(k, _)| *k != key) {
                    Counters::bump(&self.counters.evictions);
                    tracing::debug!(key = %evicted_key, "Evicted least recently used entry");
                }
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached recommendations");
            }
            Err(e) => {
                Counters::bump(&self.counters.failures);
                match e {
                    AppError::Internal(_) => {
                        tracing::error!(key = %key, error = %e, "Recommendation compute failed")
                    }
                    _ => tracing::warn!(key = %key, error = %e, "Recommendation compute failed"),
                }
            }
        }
        self.pending.remove(&key);
    }

    /// Drops ready entries matching `predicate`, returning how many were removed
    fn invalidate_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut ready = self.ready.lock();
        let stale: Vec<CacheKey> = ready
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| predicate(key))
            .collect();
        for key in &stale {
            ready.pop(key);
        }
        stale.len()
    }
}

/// Memoizes recommendation results per (strategy, subject, limit)
///
/// - Fresh entries are served without calling the engine.
/// - Concurrent requests for one key share a single compute (single-flight).
/// - Computes run in their own task, so a caller that stops waiting does not
///   cancel the work; the result still lands in the cache.
/// - A failed compute leaves no entry behind.
/// - Size is bounded; the least recently used entry is evicted first.
///
/// In-flight computes live in a sharded map, so only keys in the same shard
/// contend, and no lock is held across an await.
#[derive(Clone)]
pub struct RecommendationCache {
    inner: Arc<Inner>,
    engine: Arc<dyn Recommender>,
}

impl RecommendationCache {
    pub fn new(engine: Arc<dyn Recommender>, settings: CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                ready: Mutex::new(LruCache::new(capacity)),
                pending: DashMap::new(),
                settings,
                counters: Counters::default(),
            }),
            engine,
        }
    }

    /// Returns the cached result for `request`, computing it on miss or expiry
    pub async fn get_or_compute(&self, request: RecommendationRequest) -> Outcome {
        let key = request.cache_key();

        if let Some(value) = self.inner.lookup(key) {
            return Ok(value);
        }

        let rx = match self.inner.pending.entry(key) {
            Entry::Occupied(occupied) => {
                Counters::bump(&self.inner.counters.joins);
                tracing::debug!(key = %key, "Joining in-flight compute");
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                // A flight for this key may have settled since the first lookup.
                if let Some(value) = self.inner.lookup(key) {
                    return Ok(value);
                }
                Counters::bump(&self.inner.counters.misses);
                tracing::debug!(key = %key, "Cache miss");
                let rx = self.start_flight(key, request);
                vacant.insert(rx.clone());
                rx
            }
        };

        Self::await_flight(rx, key).await
    }

    /// Spawns the compute for `key` and returns a handle to its outcome
    fn start_flight(
        &self,
        key: CacheKey,
        request: RecommendationRequest,
    ) -> watch::Receiver<Option<Outcome>> {
        let (tx, rx) = watch::channel(None);
        let inner = Arc::clone(&self.inner);
        let engine = Arc::clone(&self.engine);
        Counters::bump(&self.inner.counters.computes);

        tokio::spawn(async move {
            let task = tokio::spawn(async move { engine.compute(request).await });
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(AppError::Internal(format!(
                    "Recommendation task failed: {}",
                    e
                ))),
            };

            inner.settle(key, &outcome);
            // Every waiter may have given up already; the entry is cached regardless.
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    async fn await_flight(mut rx: watch::Receiver<Option<Outcome>>, key: CacheKey) -> Outcome {
        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(AppError::Internal(format!(
                "Compute for {} ended without a result",
                key
            )))
        })
    }

    /// Drops a user's cached `forYou` results
    pub fn invalidate_user(&self, user_id: UserId) -> usize {
        self.inner.invalidate_where(|key| {
            key.strategy == Strategy::ForYou && key.subject == Some(user_id.0)
        })
    }

    /// Drops a product's cached `similar` results
    pub fn invalidate_product(&self, product_id: ProductId) -> usize {
        self.inner.invalidate_where(|key| {
            key.strategy == Strategy::Similar && key.subject == Some(product_id.0)
        })
    }

    /// Drops every cached result; in-flight computes still complete and cache
    pub fn clear(&self) -> usize {
        self.inner.invalidate_where(|_| true)
    }

    pub fn len(&self) -> usize {
        self.inner.ready.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            joins: counters.joins.load(Ordering::Relaxed),
            computes: counters.computes.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
