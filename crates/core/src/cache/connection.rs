//! Database connection management with pragma configuration.
//!
//! Opens the SQLite database backing every cache store, applies the pragmas
//! needed for concurrent access (WAL, foreign keys for entry cascades) and
//! runs migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Handle to the storage that holds every named cache store.
///
/// Wraps a tokio-rusqlite Connection that runs database operations on a
/// background thread. Cloning is cheap and all clones share the connection,
/// so concurrent writers serialize on it (last writer wins per key).
#[derive(Clone, Debug)]
pub struct CacheStorage {
    pub(crate) conn: Connection,
}

impl CacheStorage {
    /// Open storage at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory storage, used by tests and ephemeral runs.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let version = storage
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let enabled: i64 = storage
            .conn
            .call(|conn| conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
