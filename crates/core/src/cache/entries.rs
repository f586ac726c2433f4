//! Entry operations within a single named store.
//!
//! Only GET requests are ever read from or written to a store: lookups for
//! any other method miss, writes are rejected.

use super::connection::CacheStorage;
use super::hash::compute_request_key;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl StoredResponse {
    /// Build a GET snapshot stamped with the current time.
    pub fn get(url: impl Into<String>, status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            method: "GET".into(),
            status,
            headers,
            body,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// First header value with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handle to one named store.
///
/// Holds the shared storage handle plus the store name; acquiring one does
/// not lock anything.
#[derive(Clone, Debug)]
pub struct CacheStore {
    storage: CacheStorage,
    name: String,
}

fn is_get(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET")
}

struct EntryRow {
    key_hash: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
    stored_at: String,
}

impl EntryRow {
    fn encode(entry: &StoredResponse) -> Result<Self, Error> {
        if !is_get(&entry.method) {
            return Err(Error::UnsupportedMethod(entry.method.to_ascii_uppercase()));
        }
        let headers_json = serde_json::to_string(&entry.headers).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        Ok(Self {
            key_hash: compute_request_key("GET", &entry.url),
            url: entry.url.clone(),
            status: i64::from(entry.status),
            headers_json,
            body: entry.body.clone(),
            stored_at: entry.stored_at.clone(),
        })
    }
}

fn ensure_store_exists(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
        params![name],
        |row| row.get(0),
    )?;
    if exists { Ok(()) } else { Err(Error::InvalidState(format!("cache store {name} has been deleted"))) }
}

fn insert_row(conn: &rusqlite::Connection, store: &str, row: &EntryRow) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO cache_entries (store_name, key_hash, method, url, status_code, headers_json, body, stored_at)
        VALUES (?1, ?2, 'GET', ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(store_name, key_hash) DO UPDATE SET
            url = excluded.url,
            status_code = excluded.status_code,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![store, row.key_hash, row.url, row.status, row.headers_json, row.body, row.stored_at],
    )?;
    Ok(())
}

impl CacheStore {
    pub(crate) fn new(storage: CacheStorage, name: String) -> Self {
        Self { storage, name }
    }

    /// Name of this store (its cache generation).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the stored response for a request.
    ///
    /// Non-GET methods always miss without touching the database.
    pub async fn match_request(&self, method: &str, url: &str) -> Result<Option<StoredResponse>, Error> {
        if !is_get(method) {
            return Ok(None);
        }

        let key_hash = compute_request_key("GET", url);
        let store = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status_code, headers_json, body, stored_at
                    FROM cache_entries WHERE store_name = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![store, key_hash], |row| {
                    Ok(EntryRow {
                        key_hash: String::new(),
                        url: row.get(0)?,
                        status: row.get(1)?,
                        headers_json: row.get(2)?,
                        body: row.get(3)?,
                        stored_at: row.get(4)?,
                    })
                });

                let row = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let headers: Vec<(String, String)> =
                    serde_json::from_str(&row.headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;
                let status = u16::try_from(row.status).map_err(|e| Error::CorruptEntry(e.to_string()))?;

                Ok(Some(StoredResponse {
                    url: row.url,
                    method: "GET".into(),
                    status,
                    headers,
                    body: row.body,
                    stored_at: row.stored_at,
                }))
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite the entry for a GET request.
    ///
    /// Concurrent writes to the same key serialize on the connection; the
    /// last one to run wins.
    pub async fn put(&self, entry: &StoredResponse) -> Result<(), Error> {
        let row = EntryRow::encode(entry)?;
        let store = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<(), Error> {
                ensure_store_exists(conn, &store)?;
                insert_row(conn, &store, &row)
            })
            .await
            .map_err(Error::from)
    }

    /// Write several entries in one transaction: either all land or none do.
    pub async fn put_all(&self, entries: &[StoredResponse]) -> Result<(), Error> {
        let rows = entries.iter().map(EntryRow::encode).collect::<Result<Vec<_>, _>>()?;
        let store = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_store_exists(&tx, &store)?;
                for row in &rows {
                    insert_row(&tx, &store, row)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the entry for a request. Returns false if nothing was stored.
    pub async fn delete(&self, method: &str, url: &str) -> Result<bool, Error> {
        if !is_get(method) {
            return Ok(false);
        }

        let key_hash = compute_request_key("GET", url);
        let store = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE store_name = ?1 AND key_hash = ?2",
                    params![store, key_hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of every stored entry, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let store = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM cache_entries WHERE store_name = ?1 ORDER BY url ASC")?;
                let urls = stmt
                    .query_map(params![store], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in this store.
    pub async fn len(&self) -> Result<u64, Error> {
        let store = self.name.clone();
        self.storage
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE store_name = ?1", params![store], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }
}
