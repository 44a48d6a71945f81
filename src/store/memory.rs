//! In-process store backed by moka.
//!
//! moka's entry API coalesces concurrent initialisations of the same key:
//! the first caller runs the computation, later callers wait for its result.
//! That is exactly the at-most-one-computation guarantee [`Store`] demands.
//!
//! # Expiry
//!
//! Each entry remembers the `expires_in` it was stored with; entries stored
//! without one fall back to [`StoreConfig::ttl`], and live until evicted or
//! deleted when neither is set.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use serde_json::Value;

use super::{ComputeFuture, Fetched, Store, StoreOptions};
use crate::key::CacheKey;
use crate::{MimirError, Result};

/// Configuration for [`MemoryStore`].
///
/// ```rust
/// # use mimir::StoreConfig;
/// # use std::time::Duration;
/// let config = StoreConfig::new()
///     .max_entries(50_000)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// Fallback time-to-live for entries stored without `expires_in`.
    /// Default: none.
    pub ttl: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: None,
        }
    }
}

impl StoreConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the fallback time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: Value,
    expires_in: Option<Duration>,
}

struct PerEntryExpiry {
    fallback: Option<Duration>,
}

impl Expiry<CacheKey, StoredValue> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.expires_in.or(self.fallback)
    }
}

/// Thread-safe in-memory [`Store`].
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<CacheKey, StoredValue>,
}

impl MemoryStore {
    /// Create a store from the given configuration.
    pub fn new(config: &StoreConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(PerEntryExpiry {
                fallback: config.ttl,
            })
            .build();
        Self { cache }
    }

    /// Look up a value without computing anything.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        self.cache.get(key).await.map(|stored| stored.value)
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Approximate number of entries (moka updates this lazily).
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether the store is empty (see [`len`](Self::len)).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply pending evictions and bookkeeping, making [`len`](Self::len)
    /// exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_or_compute(
        &self,
        key: &CacheKey,
        options: &StoreOptions,
        compute: ComputeFuture<'_>,
    ) -> Result<Fetched> {
        let expires_in = options.expires_in;
        let init = async move {
            let value = compute.await?;
            Ok::<_, MimirError>(StoredValue { value, expires_in })
        };

        let entry = self
            .cache
            .entry(key.clone())
            .or_try_insert_with(init)
            .await?;

        let was_hit = !entry.is_fresh();
        Ok(Fetched {
            value: entry.into_value().value,
            was_hit,
        })
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
