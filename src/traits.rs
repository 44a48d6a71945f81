//! Hook exposed to the host persistence layer.

use async_trait::async_trait;

/// Post-commit notification target.
///
/// The host calls [`on_write`](WriteHook::on_write) once per successful
/// write to a scope's underlying data. Invalidation is best-effort: the
/// hook never fails, so a cache hiccup can never fail the write that
/// triggered it.
#[async_trait]
pub trait WriteHook: Send + Sync {
    /// Flush every key recorded for `scope`.
    async fn on_write(&self, scope: &str);
}
