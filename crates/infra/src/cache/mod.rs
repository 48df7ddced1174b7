//! Read-path caches and their invalidation.

#[cfg(feature = "redis")]
pub mod redis;

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::side_effects::CacheInvalidator;

#[cfg(feature = "redis")]
pub use self::redis::RedisCacheInvalidator;

/// In-process namespaced cache of JSON read models (order listings, dashboards).
#[derive(Debug, Default)]
pub struct ReadCache {
    namespaces: RwLock<HashMap<String, HashMap<String, JsonValue>>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, key: &str) -> anyhow::Result<Option<JsonValue>> {
        let map = self.namespaces.read().map_err(|_| anyhow!("read cache lock poisoned"))?;
        Ok(map.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    pub fn put(&self, namespace: &str, key: &str, value: JsonValue) -> anyhow::Result<()> {
        let mut map = self.namespaces.write().map_err(|_| anyhow!("read cache lock poisoned"))?;
        map.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Drop every entry under `namespace`; returns how many were removed.
    pub fn clear_namespace(&self, namespace: &str) -> anyhow::Result<usize> {
        let mut map = self.namespaces.write().map_err(|_| anyhow!("read cache lock poisoned"))?;
        Ok(map.remove(namespace).map(|ns| ns.len()).unwrap_or(0))
    }
}

#[async_trait]
impl CacheInvalidator for ReadCache {
    async fn invalidate(&self, namespace: &str) -> anyhow::Result<()> {
        let removed = self.clear_namespace(namespace)?;
        debug!(namespace, removed, "read cache invalidated");
        Ok(())
    }
}
