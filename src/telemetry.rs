//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `scope`: scope name (e.g. "Post")
//! - `operation`: call-site id of the cached operation (e.g. "cached_comments")

/// Cached operation calls served from the store.
///
/// Labels: `scope`, `operation`.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Cached operation calls that ran the computation.
///
/// Labels: `scope`, `operation`.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Keys newly added to a scope's invalidation set.
///
/// Labels: `scope`.
pub const KEYS_RECORDED_TOTAL: &str = "mimir_keys_recorded_total";

/// Non-empty flushes performed.
///
/// Labels: `scope`.
pub const FLUSHES_TOTAL: &str = "mimir_flushes_total";

/// Keys processed by flushes, whether or not their deletion succeeded.
///
/// Labels: `scope`.
pub const KEYS_FLUSHED_TOTAL: &str = "mimir_keys_flushed_total";

/// Store deletions that failed during a flush.
///
/// Labels: `scope`.
pub const DELETE_FAILURES_TOTAL: &str = "mimir_delete_failures_total";
