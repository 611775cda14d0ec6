use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, TrendError};
use crate::domain::NormalizedItem;
use crate::store::{Snapshot, SnapshotStore};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations.to_latest(&mut conn).map_err(|e| {
            tracing::error!("Migration failed: {}", e);
            TrendError::Database(rusqlite::Error::InvalidQuery)
        })?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            TrendError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl SnapshotStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT payload, fetched_at, ttl_secs FROM cache_entries WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((payload, fetched_at, ttl_secs)) = row else {
            return Ok(None);
        };

        let items: Vec<NormalizedItem> = serde_json::from_str(&payload)?;
        Ok(Some(Snapshot::new(
            key,
            items,
            Self::millis_to_datetime(fetched_at),
            u64::try_from(ttl_secs).unwrap_or(0),
        )))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<bool> {
        let payload = serde_json::to_string(&snapshot.items)?;
        let ttl_secs = i64::try_from(snapshot.ttl_secs).unwrap_or(i64::MAX);

        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO cache_entries (key, payload, fetched_at, ttl_secs)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                fetched_at = excluded.fetched_at,
                ttl_secs = excluded.ttl_secs
             WHERE excluded.fetched_at >= cache_entries.fetched_at",
            params![
                snapshot.key,
                payload,
                snapshot.fetched_at.timestamp_millis(),
                ttl_secs
            ],
        )?;

        Ok(changed > 0)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM cache_entries", [])?)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let purged = conn.execute(
            "DELETE FROM cache_entries WHERE fetched_at + ttl_secs * 1000 <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(purged)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM cache_entries ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}
