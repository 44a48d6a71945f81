//! Cached operations: one generic invocation path for every definition.
//!
//! A [`CachedOperation`] is the descriptor produced by
//! [`Mimir::define_cached`](crate::Mimir::define_cached): the scope it
//! belongs to, its call-site id (`cached_<operation>`), its
//! [`OperationOptions`] and its compute function. Every call runs the same
//! protocol (also used by the inline [`Mimir::covercache`](crate::Mimir::covercache)):
//!
//! 1. compose the [`CacheKey`](crate::CacheKey) from the scope, its digest,
//!    the call-site id, the receiver's identity, the registration-time key
//!    fragments and the call arguments;
//! 2. fetch-or-compute through the [`Store`];
//! 3. on a miss, record the key against the scope so the next write
//!    flushes it.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::key::KeyBuilder;
use crate::metadata::Identity;
use crate::registry::InvalidationRegistry;
use crate::scope::Scope;
use crate::store::{ComputeFuture, Store, StoreOptions};
use crate::telemetry;
use crate::{MimirError, Result};

/// Type-erased compute function of an operation.
pub(crate) type ComputeFn<I, R> =
    Arc<dyn Fn(I, Vec<Value>) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Box a user closure into a [`ComputeFn`].
pub(crate) fn compute_fn<I, R, F, Fut>(compute: F) -> ComputeFn<I, R>
where
    F: Fn(I, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    Arc::new(move |receiver, args| Box::pin(compute(receiver, args)))
}

/// Key-building and store configuration of a cached operation.
///
/// ```rust
/// # use mimir::OperationOptions;
/// # use std::time::Duration;
/// let options = OperationOptions::new()
///     .key_fragment("v2")
///     .expires_in(Duration::from_secs(600))
///     .store_option("race_condition_ttl", 5)
///     .debug(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    /// Fragments prepended to the call arguments in every key.
    pub extra_key_fragments: Vec<Value>,
    /// Options forwarded verbatim to the store.
    pub store_options: StoreOptions,
    /// Build keys from explicit fragments only.
    pub skip_auto_key: bool,
    /// Log each composed key.
    pub debug: bool,
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixed key fragment.
    pub fn key_fragment(mut self, fragment: impl Into<Value>) -> Self {
        self.extra_key_fragments.push(fragment.into());
        self
    }

    /// Build keys from explicit fragments only (no scope, digest, call site
    /// or instance).
    pub fn skip_auto_key(mut self, skip: bool) -> Self {
        self.skip_auto_key = skip;
        self
    }

    /// Log each composed key at debug level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Per-entry expiry forwarded to the store.
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.store_options.expires_in = Some(ttl);
        self
    }

    /// Any other store option, forwarded verbatim.
    pub fn store_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.store_options.extra.insert(name.into(), value.into());
        self
    }
}

struct OperationInner<I, R> {
    scope: Arc<Scope>,
    call_site: String,
    options: OperationOptions,
    compute: ComputeFn<I, R>,
    registry: Arc<InvalidationRegistry>,
    store: Arc<dyn Store>,
}

/// A registered cached operation.
///
/// `I` is the receiver type (`()` for class-level operations) and `R` the
/// result type, cached as JSON. Cloning is cheap.
pub struct CachedOperation<I, R> {
    inner: Arc<OperationInner<I, R>>,
    _result: PhantomData<fn() -> R>,
}

impl<I, R> Clone for CachedOperation<I, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _result: PhantomData,
        }
    }
}

impl<I, R> CachedOperation<I, R> {
    pub(crate) fn new(
        scope: Arc<Scope>,
        call_site: String,
        options: OperationOptions,
        compute: ComputeFn<I, R>,
        registry: Arc<InvalidationRegistry>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            inner: Arc::new(OperationInner {
                scope,
                call_site,
                options,
                compute,
                registry,
                store,
            }),
            _result: PhantomData,
        }
    }

    /// Call-site id, `cached_<operation>`.
    pub fn name(&self) -> &str {
        &self.inner.call_site
    }

    /// Scope the operation belongs to.
    pub fn scope(&self) -> &Arc<Scope> {
        &self.inner.scope
    }

    /// Options the operation was defined with.
    pub fn options(&self) -> &OperationOptions {
        &self.inner.options
    }
}

impl<I, R> CachedOperation<I, R>
where
    I: Identity + Send,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    /// Run the operation for `receiver` with the given arguments.
    ///
    /// Arguments are folded into the key. If the last argument is an object
    /// with a `"cache_key"` field, that field is appended to the key and
    /// removed before the arguments reach the compute function, which only
    /// runs on a miss.
    pub async fn call(&self, receiver: I, args: Vec<Value>) -> Result<R> {
        let inner = &*self.inner;
        let compute = &*inner.compute;
        Invocation {
            scope: &inner.scope,
            call_site: &inner.call_site,
            instance: receiver.instance_identity(),
            options: &inner.options,
            registry: &inner.registry,
            store: &*inner.store,
        }
        .run(args, move |args| compute(receiver, args))
        .await
    }
}

impl<R> CachedOperation<(), R>
where
    R: Serialize + DeserializeOwned + Send + 'static,
{
    /// Run a class-level operation.
    pub async fn invoke(&self, args: Vec<Value>) -> Result<R> {
        self.call((), args).await
    }
}

/// One memoized call: the protocol shared by [`CachedOperation::call`] and
/// [`Mimir::covercache`](crate::Mimir::covercache).
pub(crate) struct Invocation<'a> {
    pub(crate) scope: &'a Scope,
    pub(crate) call_site: &'a str,
    pub(crate) instance: Option<String>,
    pub(crate) options: &'a OperationOptions,
    pub(crate) registry: &'a InvalidationRegistry,
    pub(crate) store: &'a dyn Store,
}

impl Invocation<'_> {
    /// Key the call, fetch-or-compute it and record the key on a miss.
    ///
    /// `compute` receives the arguments with the override stripped and is
    /// only invoked when the store misses.
    pub(crate) async fn run<R, F, Fut>(self, args: Vec<Value>, compute: F) -> Result<R>
    where
        R: Serialize + DeserializeOwned + Send,
        F: FnOnce(Vec<Value>) -> Fut + Send,
        Fut: Future<Output = Result<R>> + Send,
    {
        let extra_len = self.options.extra_key_fragments.len();

        let mut fragments = self.options.extra_key_fragments.clone();
        fragments.extend(args);

        let (key, mut fragments) = KeyBuilder::new(self.scope.name())
            .content_digest(self.scope.content_digest().map(str::to_string))
            .call_site(self.call_site)
            .instance(self.instance)
            .fragments(fragments)
            .skip_auto_key(self.options.skip_auto_key)
            .debug(self.options.debug)
            .build();

        // an override object emptied by extraction may have been the last fragment
        let args = if fragments.len() > extra_len {
            fragments.split_off(extra_len)
        } else {
            Vec::new()
        };

        let compute: ComputeFuture<'_> = Box::pin(async move {
            let result = compute(args).await?;
            Ok::<_, MimirError>(serde_json::to_value(result)?)
        });

        let fetched = self
            .store
            .fetch_or_compute(&key, &self.options.store_options, compute)
            .await?;

        let scope_label = self.scope.name().to_string();
        let operation_label = self.call_site.to_string();
        if fetched.was_hit {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "scope" => scope_label, "operation" => operation_label)
                .increment(1);
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "scope" => scope_label, "operation" => operation_label)
                .increment(1);
            self.registry.record(self.scope, key);
        }

        Ok(serde_json::from_value(fetched.value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder_pattern() {
        let options = OperationOptions::new()
            .key_fragment("v2")
            .expires_in(Duration::from_secs(60))
            .store_option("compress", true)
            .skip_auto_key(true)
            .debug(true);

        assert_eq!(options.extra_key_fragments, vec![Value::from("v2")]);
        assert_eq!(options.store_options.expires_in, Some(Duration::from_secs(60)));
        assert_eq!(options.store_options.get("compress"), Some(&Value::Bool(true)));
        assert!(options.skip_auto_key);
        assert!(options.debug);
    }
}
