//! Key-value store boundary.
//!
//! Mimir never owns cached values. It hands a [`CacheKey`] and a compute
//! future to a [`Store`] and only tracks which keys it will later have to
//! delete. Values cross the boundary as [`serde_json::Value`] so the trait
//! stays object safe; typed results are (de)serialized by
//! [`CachedOperation`](crate::CachedOperation).
//!
//! [`MemoryStore`] is the in-process implementation. A shared backend
//! (redis, memcached, ...) implements the same trait, typically keying on
//! [`CacheKey::fingerprint`].

pub mod memory;

pub use memory::{MemoryStore, StoreConfig};

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::Result;
use crate::key::CacheKey;

/// Computation run by the store on a miss.
pub type ComputeFuture<'a> = BoxFuture<'a, Result<Value>>;

/// Outcome of [`Store::fetch_or_compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// The cached or freshly computed value.
    pub value: Value,
    /// `false` when this call ran the computation.
    pub was_hit: bool,
}

impl Fetched {
    /// A value served from the store.
    pub fn hit(value: Value) -> Self {
        Self {
            value,
            was_hit: true,
        }
    }

    /// A value computed by this call.
    pub fn miss(value: Value) -> Self {
        Self {
            value,
            was_hit: false,
        }
    }
}

/// Options forwarded verbatim to the store.
///
/// Mimir interprets none of them; `expires_in` is broken out only because
/// almost every store understands expiry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOptions {
    /// Per-entry time-to-live.
    pub expires_in: Option<Duration>,
    /// Any other store-specific option.
    pub extra: Map<String, Value>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-entry time-to-live.
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }

    /// Set an arbitrary store option.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Look up an arbitrary store option.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// External key-value store consumed by mimir.
///
/// # Contract
///
/// Implementations MUST run at most one `compute` concurrently per
/// identical key within a process. Callers that arrive while a computation
/// is in flight wait for it and observe `was_hit == true`. Mimir relies on
/// this to record each computed key once and to avoid thundering herds.
#[async_trait]
pub trait Store: Send + Sync {
    /// Return the value under `key`, running `compute` and storing its
    /// output when absent.
    ///
    /// Errors from `compute` or from the store itself are returned as-is.
    async fn fetch_or_compute(
        &self,
        key: &CacheKey,
        options: &StoreOptions,
        compute: ComputeFuture<'_>,
    ) -> Result<Fetched>;

    /// Remove the value under `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<()>;
}
