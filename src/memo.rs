//! Mimir - the memoization entry point.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metadata::{Identity, ModelMetadataSource, NoDigest};
use crate::operation::{CachedOperation, Invocation, OperationOptions, compute_fn};
use crate::registry::InvalidationRegistry;
use crate::scope::Scope;
use crate::store::Store;
use crate::traits::WriteHook;
use crate::{MimirBuilder, MimirError, Result};

/// Owns the store, the scope registry and the metadata source.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Mimir {
    store: Arc<dyn Store>,
    registry: Arc<InvalidationRegistry>,
    metadata: Arc<dyn ModelMetadataSource>,
}

impl Mimir {
    /// Create a new builder for configuring mimir.
    pub fn builder() -> MimirBuilder {
        MimirBuilder::new()
    }

    /// Mimir over `store` with unversioned keys.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_metadata(store, Arc::new(NoDigest))
    }

    pub(crate) fn with_metadata(
        store: Arc<dyn Store>,
        metadata: Arc<dyn ModelMetadataSource>,
    ) -> Self {
        Self {
            registry: Arc::new(InvalidationRegistry::new(Arc::clone(&store))),
            store,
            metadata,
        }
    }

    /// The store cached values live in.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The scope registry.
    pub fn registry(&self) -> &Arc<InvalidationRegistry> {
        &self.registry
    }

    /// Register a scope, computing its content digest once.
    ///
    /// A missing digest is not an error; keys of the scope are then simply
    /// unversioned.
    pub fn register_scope(&self, name: &str) -> Result<Arc<Scope>> {
        let digest = self.metadata.source_digest(name);
        self.registry.register(name, digest)
    }

    /// Look up a registered scope.
    pub fn scope(&self, name: &str) -> Option<Arc<Scope>> {
        self.registry.scope(name)
    }

    /// Define an instance-bound cached operation.
    ///
    /// Produces `cached_<operation>`: calling it with a receiver and
    /// arguments returns the cached result of `compute(receiver, args)`.
    /// Fails if the scope is unknown, the operation name is empty or
    /// contains whitespace, or the name is already taken in the scope.
    pub fn define_cached<I, R, F, Fut>(
        &self,
        scope: &str,
        operation: &str,
        options: OperationOptions,
        compute: F,
    ) -> Result<CachedOperation<I, R>>
    where
        I: Identity,
        R: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(I, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        if operation.is_empty() || operation.chars().any(char::is_whitespace) {
            return Err(MimirError::InvalidOperationName(operation.to_string()));
        }
        let scope = self
            .registry
            .scope(scope)
            .ok_or_else(|| MimirError::UnknownScope(scope.to_string()))?;
        let call_site = scope.define_operation(operation)?;

        debug!(scope = scope.name(), operation = %call_site, "defined cached operation");
        Ok(CachedOperation::new(
            scope,
            call_site,
            options,
            compute_fn(compute),
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
        ))
    }

    /// Define a class-level cached operation (no receiver).
    pub fn define_class_cached<R, F, Fut>(
        &self,
        scope: &str,
        operation: &str,
        options: OperationOptions,
        compute: F,
    ) -> Result<CachedOperation<(), R>>
    where
        R: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.define_cached(scope, operation, options, move |(), args| compute(args))
    }

    /// Flush a scope by name; returns the number of keys processed.
    pub async fn flush(&self, scope: &str) -> usize {
        self.registry.flush_named(scope).await
    }

    /// Cache an ad-hoc computation under explicit key fragments.
    ///
    /// Runs the same protocol as a defined operation without registering
    /// one: the key is `[scope, digest?, call_site, identity?, fragments...]`
    /// (a trailing `"cache_key"` object is appended as an override), and a
    /// miss records the key so the scope's next write flushes it. `compute`
    /// is only awaited on a miss.
    ///
    /// Fails if the scope is unknown or `call_site` is empty or contains
    /// whitespace.
    pub async fn covercache<I, R, Fut>(
        &self,
        scope: &str,
        call_site: &str,
        receiver: &I,
        fragments: Vec<Value>,
        options: &OperationOptions,
        compute: Fut,
    ) -> Result<R>
    where
        I: Identity + ?Sized,
        R: Serialize + DeserializeOwned + Send,
        Fut: Future<Output = Result<R>> + Send,
    {
        if call_site.is_empty() || call_site.chars().any(char::is_whitespace) {
            return Err(MimirError::InvalidOperationName(call_site.to_string()));
        }
        let scope = self
            .registry
            .scope(scope)
            .ok_or_else(|| MimirError::UnknownScope(scope.to_string()))?;

        Invocation {
            scope: &scope,
            call_site,
            instance: receiver.instance_identity(),
            options,
            registry: &self.registry,
            store: &*self.store,
        }
        .run(fragments, |_args| compute)
        .await
    }

    /// Flush a scope on the tokio runtime without waiting for it.
    ///
    /// For commit hooks that cannot await. Outside a tokio runtime nothing
    /// is flushed: a warning is logged and `None` returned.
    pub fn spawn_on_write(&self, scope: &str) -> Option<JoinHandle<usize>> {
        let Ok(handle) = Handle::try_current() else {
            warn!(scope, "no tokio runtime, flush skipped");
            return None;
        };
        let registry = Arc::clone(&self.registry);
        let scope = scope.to_string();
        Some(handle.spawn(async move { registry.flush_named(&scope).await }))
    }
}

#[async_trait]
impl WriteHook for Mimir {
    async fn on_write(&self, scope: &str) {
        self.flush(scope).await;
    }
}
