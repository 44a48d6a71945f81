//! Per-scope invalidation state.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::key::CacheKey;
use crate::{MimirError, Result};

/// One logical cacheable namespace, normally one per model type.
///
/// Owns the set of keys produced for it since the last flush, plus the
/// table of operation names defined against it. Keys are added on cache
/// misses and drained all at once by
/// [`InvalidationRegistry::flush`](crate::InvalidationRegistry::flush).
#[derive(Debug)]
pub struct Scope {
    name: String,
    content_digest: Option<String>,
    recorded_keys: Mutex<HashSet<CacheKey>>,
    operations: RwLock<HashMap<String, String>>,
}

impl Scope {
    pub(crate) fn new(name: String, content_digest: Option<String>) -> Self {
        Self {
            name,
            content_digest,
            recorded_keys: Mutex::new(HashSet::new()),
            operations: RwLock::new(HashMap::new()),
        }
    }

    /// Scope name, e.g. the model type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version marker computed at registration, if any.
    pub fn content_digest(&self) -> Option<&str> {
        self.content_digest.as_deref()
    }

    /// Insert a key; returns `false` if it was already recorded.
    pub(crate) fn record(&self, key: CacheKey) -> bool {
        self.keys().insert(key)
    }

    /// Swap the recorded set with an empty one and hand back the old keys.
    pub(crate) fn drain(&self) -> HashSet<CacheKey> {
        std::mem::take(&mut *self.keys())
    }

    /// Whether `key` is currently recorded.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.keys().contains(key)
    }

    /// Number of keys recorded since the last flush.
    pub fn recorded_len(&self) -> usize {
        self.keys().len()
    }

    /// Snapshot of the recorded keys. Order is not guaranteed.
    pub fn recorded_keys(&self) -> Vec<CacheKey> {
        self.keys().iter().cloned().collect()
    }

    /// Register an operation name; its call-site id is `cached_<operation>`.
    pub(crate) fn define_operation(&self, operation: &str) -> Result<String> {
        let mut operations = self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if operations.contains_key(operation) {
            return Err(MimirError::OperationAlreadyDefined {
                scope: self.name.clone(),
                operation: operation.to_string(),
            });
        }
        let call_site = format!("cached_{operation}");
        operations.insert(operation.to_string(), call_site.clone());
        Ok(call_site)
    }

    /// Names of the operations defined against this scope.
    pub fn operations(&self) -> Vec<String> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    // Every critical section is a single set operation; poisoning is ignored.
    fn keys(&self) -> MutexGuard<'_, HashSet<CacheKey>> {
        self.recorded_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
