//! Cache key derivation.
//!
//! A [`CacheKey`] is an ordered sequence of string components. With
//! auto-keying on, the sequence starts with a prefix identifying where the
//! value came from:
//!
//! ```text
//! [scope, digest?, call_site, instance?, fragments..., override?]
//! ```
//!
//! `digest` and `instance` appear only when known. With
//! [`KeyBuilder::skip_auto_key`] the prefix is dropped entirely and only the
//! explicit fragments (plus the override) remain.
//!
//! # Override fragment
//!
//! When the last explicit fragment is a JSON object carrying the reserved
//! [`CACHE_KEY_FIELD`] field, that field is removed from the object and its
//! value is appended after all fragments. It never replaces them.
//!
//! # Identity
//!
//! Component order is part of a key's identity. Keys also remember which
//! auto components were present and how many trailing components came from
//! the override, so an instance-bound key `[Post, call, 42]` never equals a
//! class-level key whose `42` came from an argument, and an override `1`
//! never equals a plain argument `1`.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Reserved field name carrying a caller-supplied override fragment.
pub const CACHE_KEY_FIELD: &str = "cache_key";

/// Separator used by [`CacheKey::joined`].
const JOIN_SEPARATOR: &str = "/";

/// Which auto-key components a key was built with, and how many trailing
/// components came from the override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
struct KeyShape {
    auto: bool,
    digest: bool,
    instance: bool,
    override_len: usize,
}

impl KeyShape {
    fn tag(self) -> u8 {
        u8::from(self.auto) | u8::from(self.digest) << 1 | u8::from(self.instance) << 2
    }
}

/// Deterministic identifier for one cached computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    components: Vec<String>,
    shape: KeyShape,
}

impl CacheKey {
    /// Key made only of explicit components (no auto prefix).
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
            shape: KeyShape::default(),
        }
    }

    /// The ordered components of this key.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the key has no components at all.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether the key carries the auto-generated prefix.
    pub fn is_auto_keyed(&self) -> bool {
        self.shape.auto
    }

    /// Components joined by `/`, the form most string-keyed stores expect.
    ///
    /// Joining is lossy (`["a/b"]` and `["a", "b"]` render the same), so
    /// stores that need a collision-free string should use
    /// [`fingerprint`](Self::fingerprint).
    pub fn joined(&self) -> String {
        self.components.join(JOIN_SEPARATOR)
    }

    /// Stable SHA-256 hex digest over the key's shape and its
    /// length-prefixed components.
    ///
    /// Unlike [`DefaultHasher`](std::collections::hash_map::DefaultHasher)
    /// this is identical across processes and builds.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update([self.shape.tag()]);
        hasher.update((self.shape.override_len as u64).to_be_bytes());
        for component in &self.components {
            hasher.update((component.len() as u64).to_be_bytes());
            hasher.update(component.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// Builder for a single invocation's [`CacheKey`].
///
/// ```rust
/// # use mimir::key::KeyBuilder;
/// let (key, _args) = KeyBuilder::new("Post")
///     .content_digest(Some("d1".to_string()))
///     .call_site("cached_comments")
///     .instance(Some("42".to_string()))
///     .build();
/// assert_eq!(key.components(), ["Post", "d1", "cached_comments", "42"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    scope: String,
    content_digest: Option<String>,
    call_site: Option<String>,
    instance: Option<String>,
    fragments: Vec<Value>,
    skip_auto_key: bool,
    debug: bool,
}

impl KeyBuilder {
    /// Start a key for the given scope name.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    /// Content digest of the scope, if one could be computed.
    pub fn content_digest(mut self, digest: Option<String>) -> Self {
        self.content_digest = digest;
        self
    }

    /// Identifier of the named cached operation.
    pub fn call_site(mut self, call_site: impl Into<String>) -> Self {
        self.call_site = Some(call_site.into());
        self
    }

    /// Identity of the bound receiver, if it has one.
    pub fn instance(mut self, identity: Option<String>) -> Self {
        self.instance = identity;
        self
    }

    /// Append one explicit fragment.
    ///
    /// Fragments are compared as text: the string `"1"` and the number `1`
    /// yield the same component, as do a string and an object or array
    /// whose compact JSON it spells.
    pub fn fragment(mut self, value: impl Into<Value>) -> Self {
        self.fragments.push(value.into());
        self
    }

    /// Append several explicit fragments, in order.
    pub fn fragments<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.fragments.extend(values);
        self
    }

    /// Omit scope, digest, call site and instance from the key.
    pub fn skip_auto_key(mut self, skip: bool) -> Self {
        self.skip_auto_key = skip;
        self
    }

    /// Emit the composed key through `tracing` once built.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Compose the key.
    ///
    /// Also returns the explicit fragments with the override field removed,
    /// which is what the cached computation gets to see.
    pub fn build(self) -> (CacheKey, Vec<Value>) {
        let mut fragments = self.fragments;
        let override_fragment = extract_override(&mut fragments);

        let mut shape = KeyShape::default();
        let mut raw: Vec<Value> = Vec::with_capacity(fragments.len() + 5);

        if !self.skip_auto_key {
            shape.auto = true;
            raw.push(Value::String(self.scope.clone()));
            if let Some(digest) = self.content_digest.filter(|d| !d.is_empty()) {
                shape.digest = true;
                raw.push(Value::String(digest));
            }
            if let Some(call_site) = self.call_site {
                raw.push(Value::String(call_site));
            }
            if let Some(instance) = self.instance.filter(|i| !i.is_empty()) {
                shape.instance = true;
                raw.push(Value::String(instance));
            }
        }

        raw.extend(fragments.iter().cloned());
        let mut components = flatten_components(raw);
        if let Some(fragment) = override_fragment {
            let appended = flatten_components(vec![fragment]);
            shape.override_len = appended.len();
            components.extend(appended);
        }

        let key = CacheKey { components, shape };

        if self.debug {
            debug!(target: "mimir::key", scope = %self.scope, key = ?key.components(), "composed cache key");
        }

        (key, fragments)
    }
}

/// Pull the reserved override field out of a trailing object fragment.
///
/// An object left empty by the removal is dropped from `fragments`.
fn extract_override(fragments: &mut Vec<Value>) -> Option<Value> {
    let Some(Value::Object(map)) = fragments.last_mut() else {
        return None;
    };
    let extracted = map.remove(CACHE_KEY_FIELD)?;
    if map.is_empty() {
        fragments.pop();
    }
    Some(extracted)
}

/// Flatten nested arrays one level, drop null/empty values, stringify.
fn flatten_components(raw: Vec<Value>) -> Vec<String> {
    let mut out = Vec::with_capacity(raw.len());
    for value in raw {
        match value {
            Value::Array(items) => out.extend(items.into_iter().filter_map(render)),
            other => out.extend(render(other)),
        }
    }
    out
}

fn render(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(ref items) if items.is_empty() => None,
        Value::Object(ref map) if map.is_empty() => None,
        // serde_json maps iterate in key order, so this is deterministic
        other => Some(other.to_string()),
    }
}
