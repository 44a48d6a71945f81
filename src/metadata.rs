//! Scope and instance metadata feeding the key prefix.
//!
//! - [`ModelMetadataSource`] supplies a scope's content digest once, at
//!   registration. Changing the digest (bumping a version tag, editing a
//!   hashed source file) makes every key of the scope new, so entries
//!   cached by an older implementation are never served again.
//! - [`Identity`] supplies the per-instance discriminator of a bound call.
//!
//! Both are best-effort: `None` simply omits the component.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Source of per-scope content digests.
pub trait ModelMetadataSource: Send + Sync {
    /// Version marker of the scope's implementation, if known.
    fn source_digest(&self, scope_name: &str) -> Option<String>;
}

/// Stable identity of a record instance bound to a cached call.
pub trait Identity {
    /// Identity token, or `None` when the receiver has no stable identity.
    fn instance_identity(&self) -> Option<String>;
}

/// Class-level calls have no receiver identity.
impl Identity for () {
    fn instance_identity(&self) -> Option<String> {
        None
    }
}

impl<T: Identity + ?Sized> Identity for &T {
    fn instance_identity(&self) -> Option<String> {
        (**self).instance_identity()
    }
}

impl<T: Identity + ?Sized> Identity for Arc<T> {
    fn instance_identity(&self) -> Option<String> {
        (**self).instance_identity()
    }
}

impl<T: Identity + ?Sized> Identity for Box<T> {
    fn instance_identity(&self) -> Option<String> {
        (**self).instance_identity()
    }
}

/// No digests at all; keys are never versioned.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDigest;

impl ModelMetadataSource for NoDigest {
    fn source_digest(&self, _scope_name: &str) -> Option<String> {
        None
    }
}

/// Explicit, manually bumped version tags per scope.
///
/// ```rust
/// # use mimir::metadata::{ModelMetadataSource, VersionTags};
/// let tags = VersionTags::new().tag("Post", "v3");
/// assert_eq!(tags.source_digest("Post").as_deref(), Some("v3"));
/// assert_eq!(tags.source_digest("Comment"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VersionTags {
    tags: HashMap<String, String>,
}

impl VersionTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the version tag of a scope.
    pub fn tag(mut self, scope: impl Into<String>, version: impl Into<String>) -> Self {
        self.tags.insert(scope.into(), version.into());
        self
    }
}

impl<S: Into<String>, V: Into<String>> FromIterator<(S, V)> for VersionTags {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self {
            tags: iter
                .into_iter()
                .map(|(scope, version)| (scope.into(), version.into()))
                .collect(),
        }
    }
}

impl ModelMetadataSource for VersionTags {
    fn source_digest(&self, scope_name: &str) -> Option<String> {
        self.tags.get(scope_name).cloned()
    }
}

/// One build identifier (git SHA, release version, ...) for every scope.
///
/// Every deployment of a new build starts from a cold cache.
#[derive(Debug, Clone)]
pub struct BuildDigest {
    build: String,
}

impl BuildDigest {
    pub fn new(build: impl Into<String>) -> Self {
        Self {
            build: build.into(),
        }
    }
}

impl ModelMetadataSource for BuildDigest {
    fn source_digest(&self, _scope_name: &str) -> Option<String> {
        Some(self.build.clone()).filter(|b| !b.is_empty())
    }
}

/// SHA-256 of a source file registered per scope.
///
/// Reading or hashing failures are logged at debug level and yield `None`.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    files: HashMap<String, PathBuf>,
}

impl SourceFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a scope with the file defining it.
    pub fn file(mut self, scope: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.insert(scope.into(), path.into());
        self
    }
}

impl ModelMetadataSource for SourceFiles {
    fn source_digest(&self, scope_name: &str) -> Option<String> {
        let path = self.files.get(scope_name)?;
        match fs::read(path) {
            Ok(content) => Some(hex::encode(Sha256::digest(&content))),
            Err(e) => {
                debug!(scope = scope_name, path = %path.display(), error = %e, "source digest unavailable");
                None
            }
        }
    }
}
