//! Two-tier cache of fetched item lists.
//!
//! The memory tier answers repeated reads within one process. The snapshot
//! tier (usually [`SqliteStore`](crate::store::SqliteStore)) is consulted on
//! a memory miss and survives restarts. Expired entries stay readable and
//! are reported as stale, so callers can serve them while the upstream is
//! down.

pub mod clock;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::NormalizedItem;
use crate::store::{Snapshot, SnapshotStore};

pub use clock::{Clock, ManualClock, SystemClock};

/// A cache read: the stored items and whether they are still within TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub items: Vec<NormalizedItem>,
    pub fetched_at: DateTime<Utc>,
    pub is_fresh: bool,
}

pub struct TieredCache {
    memory: Mutex<HashMap<String, Snapshot>>,
    store: Option<Arc<dyn SnapshotStore>>,
    clock: Arc<dyn Clock>,
}

impl TieredCache {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_clock(Some(store), Arc::new(SystemClock))
    }

    /// Memory tier only. Nothing outlives the process.
    pub fn memory_only() -> Self {
        Self::with_clock(None, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Option<Arc<dyn SnapshotStore>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            store,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<String, Snapshot>> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `None` only if the key was never populated (or was invalidated).
    /// A failing snapshot tier reads as a miss.
    pub fn get(&self, key: &str) -> Option<CacheHit> {
        let now = self.now();

        if let Some(snapshot) = self.memory().get(key) {
            tracing::debug!(key = %key, "memory cache hit");
            return Some(hit(snapshot, now));
        }

        let store = self.store.as_ref()?;
        let snapshot = match store.load(key) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "snapshot read failed");
                return None;
            }
        };

        tracing::debug!(key = %key, "snapshot cache hit");
        let result = hit(&snapshot, now);
        self.promote(snapshot);
        Some(result)
    }

    /// Replace the whole value for `key`, stamped with the current time.
    pub fn put(&self, key: &str, items: Vec<NormalizedItem>, ttl: Duration) -> Result<Snapshot> {
        let snapshot = Snapshot::new(key, items, self.now(), ttl.as_secs());
        self.promote(snapshot.clone());
        if let Some(store) = &self.store {
            if !store.save(&snapshot)? {
                tracing::debug!(key = %key, "newer snapshot already stored");
            }
        }
        Ok(snapshot)
    }

    /// Keep whichever of the cached and incoming snapshot was fetched last.
    fn promote(&self, snapshot: Snapshot) {
        let mut memory = self.memory();
        match memory.get(&snapshot.key) {
            Some(current) if current.fetched_at > snapshot.fetched_at => {}
            _ => {
                memory.insert(snapshot.key.clone(), snapshot);
            }
        }
    }

    /// Returns whether anything was removed from either tier.
    pub fn invalidate(&self, key: &str) -> Result<bool> {
        let in_memory = self.memory().remove(key).is_some();
        let in_store = match &self.store {
            Some(store) => store.remove(key)?,
            None => false,
        };
        Ok(in_memory || in_store)
    }

    pub fn clear_all(&self) -> Result<usize> {
        let in_memory = {
            let mut memory = self.memory();
            let count = memory.len();
            memory.clear();
            count
        };
        match &self.store {
            Some(store) => Ok(store.clear()?.max(in_memory)),
            None => Ok(in_memory),
        }
    }

    /// Drop expired entries from both tiers. Returns how many snapshot rows
    /// (or memory entries, without a snapshot tier) were purged.
    pub fn clear_expired(&self) -> Result<usize> {
        let now = self.now();
        let in_memory = {
            let mut memory = self.memory();
            let before = memory.len();
            memory.retain(|_, snapshot| snapshot.is_fresh(now));
            before - memory.len()
        };
        match &self.store {
            Some(store) => store.purge_expired(now),
            None => Ok(in_memory),
        }
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.memory().keys().cloned().collect();
        if let Some(store) = &self.store {
            keys.extend(store.keys()?);
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

fn hit(snapshot: &Snapshot, now: DateTime<Utc>) -> CacheHit {
    CacheHit {
        items: snapshot.items.clone(),
        fetched_at: snapshot.fetched_at,
        is_fresh: snapshot.is_fresh(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Article;
    use crate::store::SqliteStore;
    use chrono::TimeZone;

    const TTL: Duration = Duration::from_secs(900);

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn items(n: usize) -> Vec<NormalizedItem> {
        (0..n)
            .map(|i| {
                NormalizedItem::article(
                    "weibo",
                    format!("w{}", i),
                    format!("热搜 {}", i),
                    format!("https://s.weibo.com/{}", i),
                    Article::default(),
                )
            })
            .collect()
    }

    fn cache_with_store() -> (TieredCache, Arc<ManualClock>, Arc<SqliteStore>) {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = TieredCache::with_clock(Some(store.clone()), clock.clone());
        (cache, clock, store)
    }

    #[test]
    fn test_put_then_get_is_fresh() {
        let (cache, _, _) = cache_with_store();
        cache.put("weibo", items(2), TTL).unwrap();

        let hit = cache.get("weibo").unwrap();
        assert_eq!(hit.items, items(2));
        assert!(hit.is_fresh);
        assert_eq!(hit.fetched_at, start());
    }

    #[test]
    fn test_expired_entry_is_stale_not_absent() {
        let (cache, clock, _) = cache_with_store();
        cache.put("weibo", items(2), TTL).unwrap();

        clock.advance(chrono::Duration::seconds(901));
        let hit = cache.get("weibo").unwrap();
        assert!(!hit.is_fresh);
        assert_eq!(hit.items.len(), 2);
    }

    #[test]
    fn test_never_populated_is_absent() {
        let (cache, _, _) = cache_with_store();
        assert!(cache.get("zhihu").is_none());
    }

    #[test]
    fn test_snapshot_tier_serves_after_memory_loss() {
        let clock = Arc::new(ManualClock::new(start()));
        let store: Arc<dyn SnapshotStore> = Arc::new(SqliteStore::in_memory().unwrap());

        let first = TieredCache::with_clock(Some(store.clone()), clock.clone());
        first.put("weibo", items(3), TTL).unwrap();
        drop(first);

        let second = TieredCache::with_clock(Some(store), clock);
        let hit = second.get("weibo").unwrap();
        assert!(hit.is_fresh);
        assert_eq!(hit.items.len(), 3);
    }

    #[test]
    fn test_put_replaces_whole_value() {
        let (cache, clock, _) = cache_with_store();
        cache.put("weibo", items(3), TTL).unwrap();
        clock.advance(chrono::Duration::seconds(10));
        cache.put("weibo", items(1), TTL).unwrap();

        assert_eq!(cache.get("weibo").unwrap().items, items(1));
    }

    #[test]
    fn test_older_write_loses() {
        let (cache, clock, store) = cache_with_store();
        clock.advance(chrono::Duration::seconds(60));
        cache.put("weibo", items(2), TTL).unwrap();

        clock.set(start());
        cache.put("weibo", items(5), TTL).unwrap();

        assert_eq!(cache.get("weibo").unwrap().items.len(), 2);
        assert_eq!(store.load("weibo").unwrap().unwrap().items.len(), 2);
    }

    #[test]
    fn test_invalidate_both_tiers() {
        let (cache, _, store) = cache_with_store();
        cache.put("weibo", items(1), TTL).unwrap();

        assert!(cache.invalidate("weibo").unwrap());
        assert!(cache.get("weibo").is_none());
        assert!(store.load("weibo").unwrap().is_none());
        assert!(!cache.invalidate("weibo").unwrap());
    }

    #[test]
    fn test_clear_all_and_expired() {
        let (cache, clock, _) = cache_with_store();
        cache.put("short", items(1), Duration::from_secs(60)).unwrap();
        cache.put("long", items(1), Duration::from_secs(3600)).unwrap();

        clock.advance(chrono::Duration::seconds(120));
        assert_eq!(cache.clear_expired().unwrap(), 1);
        assert!(cache.get("short").is_none());
        assert_eq!(cache.keys().unwrap(), vec!["long".to_string()]);

        assert_eq!(cache.clear_all().unwrap(), 1);
        assert!(cache.get("long").is_none());
    }

    #[test]
    fn test_memory_only_cache() {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = TieredCache::with_clock(None, clock.clone());
        cache.put("hn", items(2), TTL).unwrap();
        assert!(cache.get("hn").unwrap().is_fresh);

        clock.advance(chrono::Duration::seconds(900));
        assert!(!cache.get("hn").unwrap().is_fresh);
        assert_eq!(cache.clear_expired().unwrap(), 1);
        assert!(cache.get("hn").is_none());
    }
}
