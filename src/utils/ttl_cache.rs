use moka::future::Cache;
use std::time::Duration;

/// Positive cache of recently seen punch keys with a fixed time-to-live.
///
/// Nothing here is authoritative: a miss falls through to the ledger store, so the cache can
/// be dropped or rebuilt at any time and several instances can run side by side.
#[derive(Clone)]
pub struct TtlKeyCache {
    inner: Cache<String, ()>,
}

impl TtlKeyCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn mark(&self, key: &str) {
        self.inner.insert(key.to_string(), ()).await;
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.get(key).await.is_some()
    }

    pub async fn forget(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Batch mark keys as seen
    pub async fn mark_batch(&self, keys: &[String]) {
        let futures: Vec<_> = keys
            .iter()
            .map(|k| self.inner.insert(k.clone(), ()))
            .collect();

        // Await all insertions concurrently
        futures::future::join_all(futures).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marks_and_forgets() {
        let cache = TtlKeyCache::new(100, Duration::from_secs(60));
        cache.mark("ext:7").await;
        cache
            .mark_batch(&["ext:8".to_string(), "ext:9".to_string()])
            .await;
        assert!(cache.contains("ext:7").await);
        assert!(cache.contains("ext:9").await);
        cache.forget("ext:7").await;
        assert!(!cache.contains("ext:7").await);
    }
}
