//! Cache database schema, versioned.
//!
//! `_migrations` records the highest applied version; every numbered file
//! under `migrations/` above it runs once, in order, on open.

use std::num::ParseIntError;

use super::Error;
use tokio_rusqlite::{Connection, params};

/// (version, SQL) pairs. Statements are written with IF NOT EXISTS so a
/// half-recorded run can be replayed.
const MIGRATIONS: &[(&str, &str)] = &[
    ("1", include_str!("../../migrations/001_cache_storage.sql")),
    ("2", include_str!("../../migrations/002_active_store.sql")),
];

/// Bring the cache schema up to date.
///
/// # Errors
///
/// `Error::MigrationFailed` for a malformed version number; SQLite errors
/// from a failing batch are passed through as `Error::Database`.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
                row.get(0)
            })
            .map_err(Error::from)?;

        for (version, sql) in MIGRATIONS {
            let version_num: i64 = version
                .parse()
                .map_err(|e: ParseIntError| Error::MigrationFailed(e.to_string()))?;
            if version_num > current {
                tracing::debug!(version = version_num, "applying cache migration");
                conn.execute_batch(sql)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version_num, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(Error::from)?;
            }
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rerun_keeps_cache_tables() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let tables: Vec<String> = conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name LIKE 'cache_%' ORDER BY name",
                )?;
                let names = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                Ok::<_, tokio_rusqlite::rusqlite::Error>(names)
            })
            .await
            .unwrap();

        assert_eq!(tables, vec!["cache_active", "cache_entries", "cache_stores"]);
    }

    #[tokio::test]
    async fn test_every_version_recorded() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();

        let count: i64 = conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0)))
            .await
            .unwrap();

        assert_eq!(count, MIGRATIONS.len() as i64);
    }
}
