//! SQLite-backed resource store plus a metadata-only store keyed by the same request key.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use skyward_core::error::RusqliteErrorExt;
use skyward_core::DatabaseError;

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineAsset {
    pub request_key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OfflineAsset {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Staleness record kept for API resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceMeta {
    pub last_updated: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct OfflineStore {
    conn: Connection,
}

type StoreResult<T> = Result<T, DatabaseError>;

impl OfflineStore {
    /// Open (or create) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(RusqliteErrorExt::into_database_error)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(RusqliteErrorExt::into_database_error)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS resources (
                    request_key TEXT PRIMARY KEY,
                    body BLOB NOT NULL,
                    content_type TEXT NOT NULL,
                    stored_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS resource_meta (
                    request_key TEXT PRIMARY KEY,
                    last_updated INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_resources_expires ON resources(expires_at);
                "#,
            )
            .map_err(RusqliteErrorExt::into_database_error)
    }

    /// Insert or replace `asset`, and its metadata record when `with_meta` is set.
    pub fn put(&mut self, asset: &OfflineAsset, with_meta: bool) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(RusqliteErrorExt::into_database_error)?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO resources (request_key, body, content_type, stored_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                asset.request_key,
                asset.body,
                asset.content_type,
                asset.stored_at.timestamp_millis(),
                asset.expires_at.timestamp_millis(),
            ],
        )
        .map_err(RusqliteErrorExt::into_database_error)?;

        if with_meta {
            tx.execute(
                "INSERT OR REPLACE INTO resource_meta (request_key, last_updated, expires_at) VALUES (?1, ?2, ?3)",
                params![
                    asset.request_key,
                    asset.stored_at.timestamp_millis(),
                    asset.expires_at.timestamp_millis(),
                ],
            )
            .map_err(RusqliteErrorExt::into_database_error)?;
        }

        tx.commit().map_err(RusqliteErrorExt::into_database_error)
    }

    pub fn get(&self, request_key: &str) -> StoreResult<Option<OfflineAsset>> {
        self.conn
            .query_row(
                "SELECT request_key, body, content_type, stored_at, expires_at FROM resources WHERE request_key = ?1",
                params![request_key],
                |row| {
                    Ok(OfflineAsset {
                        request_key: row.get(0)?,
                        body: row.get(1)?,
                        content_type: row.get(2)?,
                        stored_at: from_millis(row.get(3)?),
                        expires_at: from_millis(row.get(4)?),
                    })
                },
            )
            .optional()
            .map_err(RusqliteErrorExt::into_database_error)
    }

    pub fn metadata(&self, request_key: &str) -> StoreResult<Option<ResourceMeta>> {
        self.conn
            .query_row(
                "SELECT last_updated, expires_at FROM resource_meta WHERE request_key = ?1",
                params![request_key],
                |row| {
                    Ok(ResourceMeta {
                        last_updated: from_millis(row.get(0)?),
                        expires_at: from_millis(row.get(1)?),
                    })
                },
            )
            .optional()
            .map_err(RusqliteErrorExt::into_database_error)
    }

    /// Keys whose resource or metadata record has expired by `now`.
    pub fn expired_keys(&self, now: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT request_key FROM resources WHERE expires_at <= ?1
                UNION
                SELECT request_key FROM resource_meta WHERE expires_at <= ?1
                "#,
            )
            .map_err(RusqliteErrorExt::into_database_error)?;

        let rows = stmt
            .query_map(params![now.timestamp_millis()], |row| row.get(0))
            .map_err(RusqliteErrorExt::into_database_error)?;

        rows.collect::<Result<Vec<String>, _>>()
            .map_err(RusqliteErrorExt::into_database_error)
    }

    /// Remove a resource together with its metadata. Returns whether anything was removed.
    pub fn remove(&mut self, request_key: &str) -> StoreResult<bool> {
        let tx = self
            .conn
            .transaction()
            .map_err(RusqliteErrorExt::into_database_error)?;

        let removed = tx
            .execute("DELETE FROM resources WHERE request_key = ?1", params![request_key])
            .map_err(RusqliteErrorExt::into_database_error)?
            + tx
                .execute("DELETE FROM resource_meta WHERE request_key = ?1", params![request_key])
                .map_err(RusqliteErrorExt::into_database_error)?;

        tx.commit().map_err(RusqliteErrorExt::into_database_error)?;
        Ok(removed > 0)
    }

    /// Drop every resource and metadata record. Returns the number of resources removed.
    pub fn clear(&mut self) -> StoreResult<usize> {
        let tx = self
            .conn
            .transaction()
            .map_err(RusqliteErrorExt::into_database_error)?;

        let removed = tx
            .execute("DELETE FROM resources", [])
            .map_err(RusqliteErrorExt::into_database_error)?;
        tx.execute("DELETE FROM resource_meta", [])
            .map_err(RusqliteErrorExt::into_database_error)?;

        tx.commit().map_err(RusqliteErrorExt::into_database_error)?;
        Ok(removed)
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM resources", [], |row| row.get::<_, i64>(0))
            .map(|count| usize::try_from(count).unwrap_or(0))
            .map_err(RusqliteErrorExt::into_database_error)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.len().map(|n| n == 0)
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use chrono::Duration;

    fn asset(key: &str, stored_at: DateTime<Utc>, max_age: Duration) -> OfflineAsset {
        OfflineAsset {
            request_key: key.to_string(),
            body: br#"{"temp_c": 12.5}"#.to_vec(),
            content_type: "application/json".to_string(),
            stored_at,
            expires_at: stored_at + max_age,
        }
    }

    fn now() -> DateTime<Utc> {
        // Millisecond precision, matching what the store persists
        from_millis(Utc::now().timestamp_millis())
    }

    #[test]
    fn test_put_and_get() {
        let mut store = OfflineStore::in_memory().unwrap();
        let a = asset("/api/weather?q=oslo", now(), Duration::minutes(15));

        store.put(&a, true).unwrap();

        assert_eq!(store.get("/api/weather?q=oslo").unwrap(), Some(a.clone()));
        let meta = store.metadata("/api/weather?q=oslo").unwrap().unwrap();
        assert_eq!(meta.last_updated, a.stored_at);
        assert_eq!(meta.expires_at, a.expires_at);
    }

    #[test]
    fn test_static_assets_have_no_metadata() {
        let mut store = OfflineStore::in_memory().unwrap();
        store.put(&asset("/app.js", now(), Duration::days(30)), false).unwrap();

        assert!(store.get("/app.js").unwrap().is_some());
        assert!(store.metadata("/app.js").unwrap().is_none());
    }

    #[test]
    fn test_expired_keys() {
        let mut store = OfflineStore::in_memory().unwrap();
        let t0 = now();
        store.put(&asset("old", t0 - Duration::hours(2), Duration::hours(1)), true).unwrap();
        store.put(&asset("new", t0, Duration::hours(1)), true).unwrap();

        assert_eq!(store.expired_keys(t0).unwrap(), vec!["old".to_string()]);
    }

    #[test]
    fn test_remove_deletes_resource_and_metadata() {
        let mut store = OfflineStore::in_memory().unwrap();
        store.put(&asset("k", now(), Duration::hours(1)), true).unwrap();

        assert!(store.remove("k").unwrap());
        assert!(store.get("k").unwrap().is_none());
        assert!(store.metadata("k").unwrap().is_none());
        assert!(!store.remove("k").unwrap());
    }

    #[test]
    fn test_clear() {
        let mut store = OfflineStore::in_memory().unwrap();
        store.put(&asset("a", now(), Duration::hours(1)), true).unwrap();
        store.put(&asset("b", now(), Duration::hours(1)), false).unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty().unwrap());
        assert!(store.metadata("a").unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");

        {
            let mut store = OfflineStore::open(&path).unwrap();
            store.put(&asset("k", now(), Duration::hours(1)), true).unwrap();
        }

        let store = OfflineStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
