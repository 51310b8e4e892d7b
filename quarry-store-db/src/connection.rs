use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::collate::collate_paths;
use crate::error::{Error, Result};
use crate::schema::SCHEMA_SQL;

/// A connection to the source-import cache database.
///
/// Opening configures pragmas and creates the schema; the database is
/// created if it does not exist yet. There is no ambient database:
/// callers hold the handle explicitly.
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Opens (or creates) the cache database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<CacheDb> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| Error::DatabaseOpen {
            path: path.to_owned(),
            source,
        })?;
        let db = CacheDb { conn };
        db.init()?;
        debug!(path = %path.display(), "opened cache database");
        Ok(db)
    }

    /// Creates an in-memory cache database (for tests).
    pub fn open_memory() -> Result<CacheDb> {
        let db = CacheDb {
            conn: Connection::open_in_memory()?,
        };
        db.init()?;
        debug!("created in-memory cache database");
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        self.conn
            .create_collation("PATHSEP", |a, b| collate_paths(a, b))?;
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Raw connection access, for walk-table scoping and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod unittests {
    use super::*;

    #[test]
    fn open_creates_schema() {
        let db = CacheDb::open_memory().unwrap();
        let tables: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN
                 ('paths', 'objects', 'refs', 'source_mappings', 'source_files')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn open_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        drop(CacheDb::open(&path).unwrap());
        drop(CacheDb::open(&path).unwrap());
    }

    #[test]
    fn collation_is_registered() {
        let db = CacheDb::open_memory().unwrap();
        let first: String = db
            .conn
            .query_row(
                "SELECT x FROM (SELECT '/r.d' AS x UNION SELECT '/r/x')
                 ORDER BY x COLLATE PATHSEP LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(first, "/r/x");
    }
}
