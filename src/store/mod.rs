pub mod sqlite;

use chrono::{DateTime, Duration, Utc};

use crate::app::Result;
use crate::domain::NormalizedItem;

pub use sqlite::SqliteStore;

/// The whole item list last fetched for one cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub key: String,
    pub items: Vec<NormalizedItem>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl Snapshot {
    pub fn new(
        key: impl Into<String>,
        items: Vec<NormalizedItem>,
        fetched_at: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            key: key.into(),
            items,
            fetched_at,
            ttl_secs,
        }
    }

    /// `None` when the TTL reaches past the representable range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.ttl_secs).ok().and_then(Duration::try_seconds)?;
        self.fetched_at.checked_add_signed(ttl)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expires| now < expires)
    }
}

/// Persisted snapshot tier. Survives process restarts.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Snapshot>>;

    /// Whole-value replace. Returns `false` when the stored snapshot is
    /// newer than `snapshot` and was left in place.
    fn save(&self, snapshot: &Snapshot) -> Result<bool>;

    fn remove(&self, key: &str) -> Result<bool>;
    fn clear(&self) -> Result<usize>;

    /// Drop every snapshot whose TTL has elapsed at `now`.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    fn keys(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_freshness_boundary() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let snapshot = Snapshot::new("weibo", Vec::new(), at, 900);

        assert!(snapshot.is_fresh(at));
        assert!(snapshot.is_fresh(at + Duration::seconds(899)));
        assert!(!snapshot.is_fresh(at + Duration::seconds(900)));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let snapshot = Snapshot::new("k", Vec::new(), at, u64::MAX);
        assert!(snapshot.is_fresh(at + Duration::days(365 * 100)));
    }
}
