//! Builder for configuring mimir instances

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::memo::Mimir;
use crate::metadata::{ModelMetadataSource, NoDigest};
use crate::store::{MemoryStore, Store, StoreConfig};
use crate::version;
use crate::{MimirError, Result};

/// Builder for [`Mimir`].
///
/// Without an explicit [`store`](Self::store) a [`MemoryStore`] is built
/// from the [`StoreConfig`]. Without a metadata source, keys are
/// unversioned.
pub struct MimirBuilder {
    store: Option<Arc<dyn Store>>,
    store_config: StoreConfig,
    metadata: Option<Arc<dyn ModelMetadataSource>>,
}

impl MimirBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            store_config: StoreConfig::default(),
            metadata: None,
        }
    }

    /// Apply a loaded [`Config`]: store settings and `[versions]` tags.
    pub fn config(mut self, config: &Config) -> Self {
        self.store_config = config.store_config();
        if !config.versions.is_empty() {
            self.metadata = Some(Arc::new(config.version_tags()));
        }
        self
    }

    /// Use a custom store instead of the built-in [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Configure the built-in [`MemoryStore`].
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    /// Source of per-scope content digests.
    pub fn metadata(mut self, source: impl ModelMetadataSource + 'static) -> Self {
        self.metadata = Some(Arc::new(source));
        self
    }

    /// Build the instance.
    pub fn build(self) -> Result<Mimir> {
        let store = match self.store {
            Some(store) => store,
            None => {
                if self.store_config.max_entries == 0 {
                    return Err(MimirError::Configuration(
                        "store max_entries must be greater than zero".to_string(),
                    ));
                }
                Arc::new(MemoryStore::new(&self.store_config)) as Arc<dyn Store>
            }
        };
        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(NoDigest) as Arc<dyn ModelMetadataSource>);

        debug!(version = %version::version_string(), "mimir initialised");
        Ok(Mimir::with_metadata(store, metadata))
    }
}

impl Default for MimirBuilder {
    fn default() -> Self {
        Self::new()
    }
}
