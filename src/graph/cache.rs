use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Expired entries are only purged once the map grows past this size
const PURGE_THRESHOLD: usize = 2048;

/// Read-mostly cache whose entries expire a fixed time after insertion
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached value if present and not yet expired
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.len() >= PURGE_THRESHOLD {
            entries.retain(|_, (_, expires_at)| *expires_at > now);
        }
        entries.insert(key, (value, now + self.ttl));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("a", 1).await;
        assert_eq!(cache.get(&"a").await, Some(1));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&"a").await, Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"a").await, None);
    }

    #[tokio::test]
    async fn test_insert_overwrites() {
        let cache = TtlCache::new(Duration::from_secs(60));
        assert!(cache.is_empty().await);
        cache.insert("k".to_string(), "old").await;
        cache.insert("k".to_string(), "new").await;
        assert_eq!(cache.get(&"k".to_string()).await, Some("new"));
        assert_eq!(cache.len().await, 1);
    }
}
