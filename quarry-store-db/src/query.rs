use std::collections::BTreeSet;

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use quarry_store_core::{StoreDir, StorePath};

use crate::connection::CacheDb;
use crate::error::{Error, Result};

/// A store object row, as recorded after an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRow {
    pub path: String,
    pub nar_size: Option<u64>,
    pub nar_hash: Option<String>,
    pub ca: Option<String>,
}

impl CacheDb {
    /// Looks for a previously imported store path whose recorded
    /// per-entry stamps exactly match the current walk relation.
    ///
    /// Candidate rows that do not parse as store paths in `store_dir`
    /// with object name `name` are skipped. Finding more than one
    /// distinct candidate is a stamp collision and fatal to the
    /// import.
    pub fn find_matching_source(
        &self,
        store_dir: &StoreDir,
        name: &str,
    ) -> Result<Option<StorePath>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT DISTINCT p.path
            FROM source_mappings AS m
            JOIN paths AS p ON p.id = m.store_path_id
            WHERE NOT EXISTS (
                SELECT 1
                FROM source_files AS f
                LEFT JOIN temp.walk_curr AS w ON w.path = f.path
                WHERE f.mapping_id = m.mapping_id
                  AND (w.stamp IS NULL OR w.stamp <> f.stamp)
            )
            AND NOT EXISTS (
                SELECT 1
                FROM temp.walk_curr AS w
                LEFT JOIN source_files AS f
                  ON f.mapping_id = m.mapping_id AND f.path = w.path
                WHERE f.stamp IS NULL
            )
            "#,
        )?;

        let mut found: Option<StorePath> = None;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let candidate: String = row.get(0)?;
            let Ok(path) = store_dir.parse(&candidate) else {
                debug!(%candidate, "skipping unparsable cache row");
                continue;
            };
            if path.name() != name {
                continue;
            }
            if found.is_some() {
                return Err(Error::AmbiguousSourceMatch {
                    name: name.to_owned(),
                });
            }
            found = Some(path);
        }
        Ok(found)
    }

    /// The recorded object row for a store path, if any.
    pub fn object(&self, path: &str) -> Result<Option<ObjectRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT p.path, o.nar_size, o.nar_hash, o.ca
             FROM objects AS o
             JOIN paths AS p ON p.id = o.id
             WHERE p.path = ?1",
        )?;
        let row = stmt
            .query_row(params![path], |row| {
                Ok(ObjectRow {
                    path: row.get(0)?,
                    nar_size: row.get::<_, Option<i64>>(1)?.map(|n| n as u64),
                    nar_hash: row.get(2)?,
                    ca: row.get(3)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// The declared references of a recorded store object.
    pub fn object_references(&self, path: &str) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT p.path
             FROM refs AS r
             JOIN paths AS p ON p.id = r.reference
             WHERE r.referrer = (SELECT id FROM paths WHERE path = ?1)",
        )?;
        let mut refs = BTreeSet::new();
        let mut rows = stmt.query(params![path])?;
        while let Some(row) = rows.next()? {
            refs.insert(row.get(0)?);
        }
        Ok(refs)
    }
}
