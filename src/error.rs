//! Mimir error types

use std::sync::Arc;

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Registration errors (programming mistakes, surfaced at definition time)
    #[error("invalid scope name: {0:?}")]
    InvalidScopeName(String),

    #[error("unknown scope: {0}")]
    UnknownScope(String),

    #[error("scope already registered: {0}")]
    ScopeAlreadyRegistered(String),

    #[error("invalid operation name: {0:?}")]
    InvalidOperationName(String),

    #[error("operation '{operation}' already defined for scope '{scope}'")]
    OperationAlreadyDefined { scope: String, operation: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Store errors, propagated unchanged from fetch-or-compute and delete
    #[error("store error: {0}")]
    Store(String),

    /// The cached computation itself failed.
    #[error("compute error: {0}")]
    Compute(#[source] Box<dyn std::error::Error + Send + Sync>),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another caller's computation for the same key failed and this caller
    /// was waiting on it.
    #[error(transparent)]
    Shared(Arc<MimirError>),
}

impl MimirError {
    /// Wrap an arbitrary error raised inside a cached computation.
    pub fn compute(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        MimirError::Compute(err.into())
    }

    /// Whether this error was raised while registering scopes or operations.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            MimirError::InvalidScopeName(_)
                | MimirError::UnknownScope(_)
                | MimirError::ScopeAlreadyRegistered(_)
                | MimirError::InvalidOperationName(_)
                | MimirError::OperationAlreadyDefined { .. }
        )
    }
}

impl From<Arc<MimirError>> for MimirError {
    fn from(err: Arc<MimirError>) -> Self {
        // The computing caller usually holds the only reference.
        Arc::try_unwrap(err).unwrap_or_else(MimirError::Shared)
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
