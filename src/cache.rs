use std::time::Duration;

use moka::future::Cache as MokaCache;

/// Keyed values that expire a fixed time after insertion. Nothing is
/// invalidated on writes; readers accept staleness up to the TTL.
#[derive(Clone)]
pub struct TtlCache<V: Clone + Send + Sync + 'static> {
    inner: MokaCache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        TtlCache {
            inner: MokaCache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: &str, value: V) {
        self.inner.insert(key.to_string(), value).await;
    }
}
