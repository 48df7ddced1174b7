//! Redis-backed cache invalidation (optional).
//!
//! Cached read models live under `namespace:*` keys; invalidation scans for
//! them and deletes them in batches.

use anyhow::Context;
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use crate::side_effects::CacheInvalidator;

const SCAN_BATCH: usize = 500;

#[derive(Debug, Clone)]
pub struct RedisCacheInvalidator {
    client: redis::Client,
}

impl RedisCacheInvalidator {
    pub fn new(redis_url: impl AsRef<str>) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url.as_ref()).context("invalid redis url")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CacheInvalidator for RedisCacheInvalidator {
    async fn invalidate(&self, namespace: &str) -> anyhow::Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("redis connection failed")?;

        let pattern = format!("{namespace}:*");
        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .context("redis SCAN failed")?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        for chunk in keys.chunks(SCAN_BATCH) {
            let _: i64 = conn.del(chunk).await.context("redis DEL failed")?;
        }
        debug!(namespace, removed = keys.len(), "redis cache invalidated");
        Ok(())
    }
}
