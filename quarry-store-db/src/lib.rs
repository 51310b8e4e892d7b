//! SQLite database interface for the source-import cache.
//!
//! The cache remembers which filesystem trees have already been
//! imported into the store and under which store path, keyed by cheap
//! per-entry metadata stamps. It is authoritative only as a negative
//! filter: a recorded mapping is reused only when every stamp still
//! matches and the store path still exists on disk.
//!
//! # Key pieces
//!
//! - [`CacheDb`]: connection management, pragmas, schema.
//! - [`WalkTable`]: the transient per-import walk relation, dropped on
//!   every exit path.
//! - Stamp queries ([`CacheDb::find_matching_source`]) and the
//!   post-import transaction ([`CacheDb::update_source_cache`]).

mod collate;
mod connection;
mod error;
mod query;
mod schema;
mod walk;
mod write;

pub use collate::collate_paths;
pub use connection::CacheDb;
pub use error::{Error, Result};
pub use query::ObjectRow;
pub use walk::{WalkEntry, WalkTable};
pub use write::StoreObjectRow;
