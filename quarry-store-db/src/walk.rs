use rusqlite::{params, Connection};
use tracing::debug;

use crate::connection::CacheDb;
use crate::error::Result;
use crate::schema::{WALK_CREATE_SQL, WALK_DROP_SQL};

/// One walked filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Cleaned absolute path.
    pub path: String,
    /// Raw `st_mode` bits.
    pub mode: u32,
    /// Byte size for regular files; `-1` otherwise.
    pub size: i64,
    /// Symlink target, for symlinks.
    pub link_target: Option<String>,
    /// Metadata stamp used for cache matching.
    pub stamp: String,
}

/// RAII scope for the transient walk relation.
///
/// Creating it (re)creates `temp.walk_curr` on the connection; dropping
/// it drops the table again, so no walk state survives an import on
/// any exit path.
pub struct WalkTable<'conn> {
    conn: &'conn Connection,
}

impl<'conn> WalkTable<'conn> {
    pub fn create(db: &'conn CacheDb) -> Result<WalkTable<'conn>> {
        let conn = db.connection();
        conn.execute_batch(WALK_DROP_SQL)?;
        conn.execute_batch(WALK_CREATE_SQL)?;
        Ok(WalkTable { conn })
    }

    pub fn insert(&self, entry: &WalkEntry) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO temp.walk_curr (path, mode, size, link_target, stamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        stmt.execute(params![
            entry.path,
            entry.mode,
            entry.size,
            entry.link_target,
            entry.stamp,
        ])?;
        Ok(())
    }

    /// All walked entries, ordered for archive emission: path order
    /// with the separator below every other byte.
    pub fn rows_sorted(&self) -> Result<Vec<WalkEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, mode, size, link_target, stamp
             FROM temp.walk_curr
             ORDER BY path COLLATE PATHSEP",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(WalkEntry {
                path: row.get(0)?,
                mode: row.get(1)?,
                size: row.get(2)?,
                link_target: row.get(3)?,
                stamp: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

impl Drop for WalkTable<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.conn.execute_batch(WALK_DROP_SQL) {
            debug!(%err, "failed to drop walk table");
        }
    }
}
