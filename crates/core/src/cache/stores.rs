//! Storage-level operations over named cache stores.
//!
//! A store name encodes the cache generation (`<prefix>-<version>`), so
//! evicting an old generation is a single `delete_store`.

use super::connection::CacheStorage;
use super::entries::CacheStore;
use crate::Error;
use chrono::Utc;
use tokio_rusqlite::params;

impl CacheStorage {
    /// Open a named store, creating it if it doesn't exist.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("store name cannot be empty".into()));
        }

        let owned = name.to_string();
        let created_at = Utc::now().to_rfc3339();
        let created = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
                    params![owned, created_at],
                )?;
                Ok(inserted > 0)
            })
            .await
            .map_err(Error::from)?;

        if created {
            tracing::debug!(store = name, "created cache store");
        }

        Ok(CacheStore::new(self.clone(), name.to_string()))
    }

    /// Handle to a store without creating it.
    ///
    /// Lookups in a missing store miss and writes fail with
    /// `Error::InvalidState`, so a deleted generation stays deleted.
    pub fn store(&self, name: &str) -> CacheStore {
        CacheStore::new(self.clone(), name.to_string())
    }

    /// Check whether a store with this name exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn
                    .query_row("SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })
                    .map_err(Error::from)?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all stores in creation order.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and every entry in it.
    ///
    /// Returns false if no such store existed.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Store claimed by the last successful activation, if it still exists.
    pub async fn active_store(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt = conn.prepare("SELECT store_name FROM cache_active WHERE id = 1")?;
                let mut rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                Ok(rows.next().transpose()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Make `name` the active store and delete every other store.
    ///
    /// Runs as one transaction: either the claim is recorded and all other
    /// stores are gone, or nothing changed. Returns the evicted names in
    /// creation order.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` if `name` does not exist.
    pub async fn claim_store(&self, name: &str) -> Result<Vec<String>, Error> {
        let name = name.to_string();
        let claimed_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;

                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(Error::InvalidState(format!("cannot claim missing cache store {name}")));
                }

                let mut stmt = tx.prepare("SELECT name FROM cache_stores WHERE name != ?1 ORDER BY rowid ASC")?;
                let evicted = stmt
                    .query_map(params![name], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                drop(stmt);

                tx.execute("DELETE FROM cache_stores WHERE name != ?1", params![name])?;
                tx.execute(
                    "INSERT INTO cache_active (id, store_name, claimed_at) VALUES (1, ?1, ?2)
                    ON CONFLICT(id) DO UPDATE SET store_name = excluded.store_name, claimed_at = excluded.claimed_at",
                    params![name, claimed_at],
                )?;
                tx.commit()?;

                Ok(evicted)
            })
            .await
            .map_err(Error::from)
    }
}
