use std::path::PathBuf;

use thiserror::Error;

/// Result type for cache database operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to open cache database at {path}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// More than one cached store path matched a single source walk.
    /// Distinct contents stamping identically means the stamps have
    /// collided; the import cannot trust either row.
    #[error("multiple cached store paths match source {name:?} (stamp collision)")]
    AmbiguousSourceMatch { name: String },
}
