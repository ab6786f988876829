use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct Slot<V> {
    value: V,
    expires_at: Instant,
}

/// Map whose entries carry their own expiry.
///
/// Expired entries are dropped on every access, and `purge_expired` lets a
/// background task bound memory for keys nobody touches again.
pub struct TtlMap<K, V> {
    entries: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for TtlMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

fn drop_expired<K, V>(entries: &mut HashMap<K, Slot<V>>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, slot| slot.expires_at > now);
    before - entries.len()
}

impl<K: Eq + Hash, V: Clone> TtlMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        drop_expired(&mut entries, now);
        entries.insert(
            key,
            Slot {
                value,
                expires_at: now + ttl,
            },
        );
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        drop_expired(&mut entries, Instant::now());
        entries.get(key).map(|slot| slot.value.clone())
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.get(key).await.is_some()
    }

    /// Replaces the entry with whatever `f` computes from the live previous
    /// value. Returning `None` leaves the map untouched.
    pub async fn update<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(Option<&V>) -> Option<(V, Duration)>,
    {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        drop_expired(&mut entries, now);
        let (value, ttl) = f(entries.get(&key).map(|slot| &slot.value))?;
        entries.insert(
            key,
            Slot {
                value: value.clone(),
                expires_at: now + ttl,
            },
        );
        Some(value)
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        drop_expired(&mut entries, Instant::now());
        entries.remove(key).map(|slot| slot.value)
    }

    /// Drops every entry whose key fails the predicate.
    pub async fn retain_keys<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| keep(key));
        before - entries.len()
    }

    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        drop_expired(&mut entries, Instant::now())
    }

    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        drop_expired(&mut entries, Instant::now());
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let map = TtlMap::new();
        map.insert("a", 1, Duration::from_secs(10)).await;
        map.insert("b", 2, Duration::from_secs(30)).await;
        assert_eq!(map.get(&"a").await, Some(1));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(map.get(&"a").await, None);
        assert_eq!(map.get(&"b").await, Some(2));
        assert_eq!(map.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_sees_only_live_values() {
        let map = TtlMap::new();
        map.insert("k", 5, Duration::from_secs(1)).await;
        tokio::time::advance(Duration::from_secs(2)).await;

        let updated = map
            .update("k", |prev| Some((prev.copied().unwrap_or(0) + 1, Duration::from_secs(5))))
            .await;
        assert_eq!(updated, Some(1));
    }

    #[tokio::test]
    async fn test_update_none_leaves_map_untouched() {
        let map: TtlMap<&str, i32> = TtlMap::new();
        assert_eq!(map.update("k", |_| None).await, None);
        assert!(map.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_retain() {
        let map = TtlMap::new();
        map.insert(("s1", "t1"), (), Duration::from_secs(1)).await;
        map.insert(("s1", "t2"), (), Duration::from_secs(100)).await;
        map.insert(("s2", "t1"), (), Duration::from_secs(100)).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(map.purge_expired().await, 1);
        assert_eq!(map.retain_keys(|(session, _)| *session != "s1").await, 1);
        assert!(map.contains(&("s2", "t1")).await);
    }
}
