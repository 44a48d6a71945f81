//! Mimir - auto-keyed memoization with per-scope group invalidation
//!
//! Cached operations are defined against a *scope* (normally one per model
//! type). Each call derives a deterministic key from the scope, its content
//! digest, the operation's call-site id, the receiver's identity and the
//! call arguments, then fetches-or-computes the value through a [`Store`].
//! Every key that missed is recorded against its scope, and a write to the
//! scope flushes all of them at once.
//!
//! # Example
//!
//! ```rust
//! use mimir::{Identity, Mimir, OperationOptions, VersionTags, WriteHook};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Post {
//!     id: u64,
//! }
//!
//! impl Identity for Post {
//!     fn instance_identity(&self) -> Option<String> {
//!         Some(self.id.to_string())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let mimir = Mimir::builder()
//!         .metadata(VersionTags::new().tag("Post", "v1"))
//!         .build()?;
//!     mimir.register_scope("Post")?;
//!
//!     let comments = mimir.define_cached(
//!         "Post",
//!         "comments",
//!         OperationOptions::new(),
//!         |post: Arc<Post>, _args| async move {
//!             Ok::<_, mimir::MimirError>(vec![format!("first comment on {}", post.id)])
//!         },
//!     )?;
//!
//!     let post = Arc::new(Post { id: 42 });
//!     let first: Vec<String> = comments.call(Arc::clone(&post), vec![]).await?;
//!     let again: Vec<String> = comments.call(post, vec![json!({ "cache_key": 1 })]).await?;
//!     assert_eq!(first, again);
//!
//!     // the host's post-commit hook
//!     mimir.on_write("Post").await;
//!     Ok(())
//! }
//! ```

mod builder;
pub mod config;
pub mod error;
pub mod key;
mod memo;
pub mod metadata;
pub mod operation;
pub mod registry;
pub mod scope;
pub mod store;
pub mod telemetry;
pub mod traits;
pub mod version;

// Re-export main types at crate root
pub use builder::MimirBuilder;
pub use config::Config;
pub use error::{MimirError, Result};
pub use key::{CACHE_KEY_FIELD, CacheKey, KeyBuilder};
pub use memo::Mimir;
pub use metadata::{BuildDigest, Identity, ModelMetadataSource, NoDigest, SourceFiles, VersionTags};
pub use operation::{CachedOperation, OperationOptions};
pub use registry::InvalidationRegistry;
pub use scope::Scope;
pub use store::{ComputeFuture, Fetched, MemoryStore, Store, StoreConfig, StoreOptions};
pub use traits::WriteHook;
pub use version::{PKG_VERSION, version_string};
