//! Versioned entry operations.
//!
//! Entries are immutable response snapshots keyed by (version, request
//! identity). They are never individually expired; a snapshot disappears
//! only when its whole version store is deleted.

use super::connection::CacheStore;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached response snapshot.
///
/// Captures everything needed to replay a response without the network:
/// status line, headers, and body bytes, frozen at store time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub version: String,
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers_json: Option<String>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

const ENTRY_COLUMNS: &str = "version, key, method, url, status, status_text, headers_json, body, stored_at";

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<Entry, rusqlite::Error> {
    Ok(Entry {
        version: row.get(0)?,
        key: row.get(1)?,
        method: row.get(2)?,
        url: row.get(3)?,
        status: row.get::<_, i64>(4)? as u16,
        status_text: row.get(5)?,
        headers_json: row.get(6)?,
        body: row.get(7)?,
        stored_at: row.get(8)?,
    })
}

fn upsert_entry(conn: &rusqlite::Connection, entry: &Entry) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO cache_entries (
            version, key, method, url, status, status_text, headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(version, key) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            status_text = excluded.status_text,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            &entry.version,
            &entry.key,
            &entry.method,
            &entry.url,
            entry.status as i64,
            &entry.status_text,
            &entry.headers_json,
            &entry.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

impl CacheStore {
    /// Insert or replace a single snapshot (lazy write-through path).
    ///
    /// Creates the version row if it doesn't exist yet, mirroring how
    /// opening a named store brings it into being on first use.
    pub async fn put_entry(&self, entry: &Entry) -> Result<(), Error> {
        let entry = entry.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_versions (version, created_at) VALUES (?1, ?2)",
                    params![&entry.version, &now],
                )?;
                upsert_entry(conn, &entry)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a snapshot by version and request key.
    ///
    /// Returns None on a cache miss.
    pub async fn get_entry(&self, version: &str, key: &str) -> Result<Option<Entry>, Error> {
        let version = version.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Entry>, Error> {
                let sql = format!("SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE version = ?1 AND key = ?2");
                let mut stmt = conn.prepare(&sql)?;
                let result = stmt.query_row(params![version, key], row_to_entry);

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Commit a whole version store in one transaction.
    ///
    /// Inserts the version row and every entry atomically: if any insert
    /// fails, the version does not come into existence at all. This is the
    /// install-time precache commit.
    pub async fn commit_version(&self, version: &str, entries: &[Entry]) -> Result<(), Error> {
        let owned_version = version.to_string();
        let count = entries.len();
        let entries = entries.to_vec();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR REPLACE INTO cache_versions (version, created_at) VALUES (?1, ?2)",
                    params![&owned_version, &now],
                )?;
                for entry in &entries {
                    upsert_entry(&tx, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(version = %version, entries = count, "committed cache version");
        Ok(())
    }

    /// List every version that currently has a store.
    pub async fn list_versions(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT version FROM cache_versions ORDER BY created_at, version")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut versions = Vec::new();
                for row in rows {
                    versions.push(row?);
                }
                Ok(versions)
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a version store exists.
    pub async fn has_version(&self, version: &str) -> Result<bool, Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn
                    .query_row(
                        "SELECT EXISTS(SELECT 1 FROM cache_versions WHERE version = ?1)",
                        params![version],
                        |row| row.get(0),
                    )
                    .map_err(Error::from)?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one version's store and all its entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_version(&self, version: &str) -> Result<u64, Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE version = ?1", params![&version])?;
                conn.execute("DELETE FROM cache_versions WHERE version = ?1", params![&version])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Count entries under a version.
    pub async fn entry_count(&self, version: &str) -> Result<u64, Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM cache_entries WHERE version = ?1",
                        params![version],
                        |row| row.get(0),
                    )
                    .map_err(Error::from)?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
