//! Scope registry and bulk invalidation.
//!
//! [`InvalidationRegistry`] owns one [`Scope`] per scope name. Every key
//! that missed the store is recorded against its scope; a write to the
//! scope's data triggers [`flush`](InvalidationRegistry::flush), which
//! deletes every recorded key from the store and resets the set.
//!
//! # Flush semantics
//!
//! ```text
//! {Empty} --record--> {NonEmpty} --record--> {NonEmpty} --flush--> {Empty}
//! ```
//!
//! The set is drained (swapped with an empty one) before any deletion is
//! issued, so a key recorded while a flush is running lands in the next
//! flush instead of being lost. Deletions are best-effort: a failing
//! delete is logged and counted, the remaining keys are still attempted,
//! and the failed key is not re-recorded. A stale entry may then survive
//! until it expires or is overwritten.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::key::CacheKey;
use crate::scope::Scope;
use crate::store::Store;
use crate::telemetry;
use crate::{MimirError, Result};

/// Registry of scopes and their recorded keys.
pub struct InvalidationRegistry {
    scopes: RwLock<HashMap<String, Arc<Scope>>>,
    store: Arc<dyn Store>,
}

impl InvalidationRegistry {
    /// Create an empty registry deleting from `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Register a new scope.
    ///
    /// Fails on an empty name or a name that is already registered.
    pub fn register(&self, name: &str, content_digest: Option<String>) -> Result<Arc<Scope>> {
        if name.trim().is_empty() {
            return Err(MimirError::InvalidScopeName(name.to_string()));
        }

        let mut scopes = self.scopes.write().unwrap_or_else(PoisonError::into_inner);
        if scopes.contains_key(name) {
            return Err(MimirError::ScopeAlreadyRegistered(name.to_string()));
        }

        debug!(scope = name, digest = ?content_digest, "registered scope");
        let scope = Arc::new(Scope::new(name.to_string(), content_digest));
        scopes.insert(name.to_string(), Arc::clone(&scope));
        Ok(scope)
    }

    /// Look up a registered scope.
    pub fn scope(&self, name: &str) -> Option<Arc<Scope>> {
        self.scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all registered scopes. Order is not guaranteed.
    pub fn scope_names(&self) -> Vec<String> {
        self.scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Record `key` against `scope`; returns `false` if already recorded.
    pub fn record(&self, scope: &Scope, key: CacheKey) -> bool {
        let inserted = scope.record(key);
        if inserted {
            metrics::counter!(telemetry::KEYS_RECORDED_TOTAL, "scope" => scope.name().to_string())
                .increment(1);
        }
        inserted
    }

    /// Delete every key recorded for `scope` and reset its set.
    ///
    /// Returns the number of keys processed, including those whose deletion
    /// failed. Never fails; an empty scope issues no store calls.
    pub async fn flush(&self, scope: &Scope) -> usize {
        let keys = scope.drain();
        if keys.is_empty() {
            return 0;
        }

        let count = keys.len();
        let results = join_all(
            keys.iter()
                .map(|key| async move { (key, self.store.delete(key).await) }),
        )
        .await;

        let mut failures = 0u64;
        for (key, result) in results {
            if let Err(e) = result {
                failures += 1;
                warn!(scope = scope.name(), key = %key, error = %e, "failed to delete cached entry");
            }
        }

        let label = scope.name().to_string();
        metrics::counter!(telemetry::FLUSHES_TOTAL, "scope" => label.clone()).increment(1);
        metrics::counter!(telemetry::KEYS_FLUSHED_TOTAL, "scope" => label.clone())
            .increment(count as u64);
        if failures > 0 {
            metrics::counter!(telemetry::DELETE_FAILURES_TOTAL, "scope" => label)
                .increment(failures);
        }

        debug!(scope = scope.name(), keys = count, failures, "flushed scope");
        count
    }

    /// Flush a scope by name. Unknown names are logged and yield 0.
    pub async fn flush_named(&self, name: &str) -> usize {
        match self.scope(name) {
            Some(scope) => self.flush(&scope).await,
            None => {
                warn!(scope = name, "flush requested for unknown scope");
                0
            }
        }
    }

    /// Flush every registered scope; returns the total keys processed.
    pub async fn flush_all(&self) -> usize {
        let scopes: Vec<Arc<Scope>> = self
            .scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut total = 0;
        for scope in scopes {
            total += self.flush(&scope).await;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> InvalidationRegistry {
        InvalidationRegistry::new(Arc::new(MemoryStore::default()))
    }

    #[test]
    fn empty_scope_name_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.register("  ", None),
            Err(MimirError::InvalidScopeName(_))
        ));
    }

    #[test]
    fn duplicate_scope_rejected() {
        let registry = registry();
        registry.register("Post", None).unwrap();
        assert!(matches!(
            registry.register("Post", Some("d2".into())),
            Err(MimirError::ScopeAlreadyRegistered(_))
        ));
    }

    #[test]
    fn lookup_returns_same_scope() {
        let registry = registry();
        let scope = registry.register("Post", Some("d1".into())).unwrap();
        let found = registry.scope("Post").unwrap();
        assert!(Arc::ptr_eq(&scope, &found));
        assert_eq!(found.content_digest(), Some("d1"));
        assert!(registry.scope("Comment").is_none());
    }

    #[tokio::test]
    async fn flush_named_unknown_scope_is_noop() {
        let registry = registry();
        assert_eq!(registry.flush_named("Missing").await, 0);
    }

    #[tokio::test]
    async fn flush_all_covers_every_scope() {
        let registry = registry();
        let posts = registry.register("Post", None).unwrap();
        let comments = registry.register("Comment", None).unwrap();
        registry.record(&posts, CacheKey::from_components(["p"]));
        registry.record(&comments, CacheKey::from_components(["c1"]));
        registry.record(&comments, CacheKey::from_components(["c2"]));

        assert_eq!(registry.flush_all().await, 3);
        assert_eq!(posts.recorded_len(), 0);
        assert_eq!(comments.recorded_len(), 0);
    }
}
