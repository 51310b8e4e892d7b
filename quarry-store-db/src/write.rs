use std::collections::BTreeSet;

use rusqlite::{params, Transaction, TransactionBehavior};
use tracing::debug;

use quarry_store_core::StorePath;

use crate::connection::CacheDb;
use crate::error::Result;

/// What gets recorded about a store object after a successful import.
#[derive(Debug, Clone)]
pub struct StoreObjectRow<'a> {
    pub path: &'a StorePath,
    pub nar_size: u64,
    pub nar_hash: &'a str,
    pub ca: &'a str,
    pub references: &'a BTreeSet<StorePath>,
}

impl CacheDb {
    /// Records a finished source import, in one immediate (write-locking)
    /// transaction:
    ///
    /// 1. delete mappings contradicted by the current walk (a shared
    ///    path whose stamp changed) and mappings covering exactly the
    ///    same path set (they are being replaced);
    /// 2. upsert the store object row and its references;
    /// 3. insert a fresh mapping and copy the walk relation into it.
    ///
    /// The walk relation itself stays untouched; its owner drops it.
    pub fn update_source_cache(&self, object: &StoreObjectRow<'_>) -> Result<()> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        invalidate_stale_mappings(&tx)?;
        let path_id = upsert_object(&tx, object)?;

        tx.execute(
            "INSERT INTO source_mappings (store_path_id) VALUES (?1)",
            params![path_id],
        )?;
        let mapping_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO source_files (mapping_id, path, stamp)
             SELECT ?1, path, stamp FROM temp.walk_curr",
            params![mapping_id],
        )?;

        tx.commit()?;
        debug!(path = %object.path, mapping_id, "recorded source import");
        Ok(())
    }
}

fn invalidate_stale_mappings(tx: &Transaction<'_>) -> Result<()> {
    // Contradicted: some walked path is recorded with a different stamp.
    tx.execute(
        "DELETE FROM source_mappings WHERE mapping_id IN (
             SELECT f.mapping_id
             FROM source_files AS f
             JOIN temp.walk_curr AS w ON w.path = f.path
             WHERE w.stamp <> f.stamp
         )",
        [],
    )?;
    // Superseded: the recorded path set is exactly the current walk.
    tx.execute(
        "DELETE FROM source_mappings WHERE mapping_id IN (
             SELECT m.mapping_id
             FROM source_mappings AS m
             WHERE NOT EXISTS (
                 SELECT 1
                 FROM source_files AS f
                 LEFT JOIN temp.walk_curr AS w ON w.path = f.path
                 WHERE f.mapping_id = m.mapping_id AND w.path IS NULL
             )
             AND NOT EXISTS (
                 SELECT 1
                 FROM temp.walk_curr AS w
                 LEFT JOIN source_files AS f
                   ON f.mapping_id = m.mapping_id AND f.path = w.path
                 WHERE f.path IS NULL
             )
         )",
        [],
    )?;
    Ok(())
}

fn upsert_object(tx: &Transaction<'_>, object: &StoreObjectRow<'_>) -> Result<i64> {
    let path_id = intern_path(tx, object.path.as_str())?;
    tx.execute(
        "INSERT INTO objects (id, nar_size, nar_hash, ca)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (id) DO UPDATE SET
             nar_size = excluded.nar_size,
             nar_hash = excluded.nar_hash,
             ca = excluded.ca",
        params![path_id, object.nar_size as i64, object.nar_hash, object.ca],
    )?;
    tx.execute("DELETE FROM refs WHERE referrer = ?1", params![path_id])?;
    for reference in object.references {
        let ref_id = intern_path(tx, reference.as_str())?;
        tx.execute(
            "INSERT INTO refs (referrer, reference) VALUES (?1, ?2)",
            params![path_id, ref_id],
        )?;
    }
    Ok(path_id)
}

fn intern_path(tx: &Transaction<'_>, path: &str) -> Result<i64> {
    tx.execute(
        "INSERT INTO paths (path) VALUES (?1) ON CONFLICT (path) DO NOTHING",
        params![path],
    )?;
    Ok(tx.query_row(
        "SELECT id FROM paths WHERE path = ?1",
        params![path],
        |row| row.get(0),
    )?)
}
