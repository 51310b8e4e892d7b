//! The source-import pipeline.
//!
//! This crate turns live filesystem trees and in-memory strings into
//! store objects: it walks and stamps sources, consults the persistent
//! import cache, streams archive bytes to the store's import endpoint
//! while hashing them in the same pass, computes the destination store
//! path, and records the import for next time.
//!
//! The host interpreter drives it through three primitives on
//! [`Eval`]: [`import_path`], [`to_file`] and [`store_derivation`].
//! Results carry a string context naming the store paths the value
//! depends on.
//!
//! [`import_path`]: Eval::import_path
//! [`to_file`]: Eval::to_file
//! [`store_derivation`]: Eval::store_derivation

mod context;
mod error;
mod eval;
mod import;
mod local;
mod source;
mod walk;

pub use context::{ContextString, OUTPUT_CONTEXT_PREFIX};
pub use error::EvalError;
pub use eval::{Eval, PathArg};
pub use import::{ExportTrailer, ImportConn, ImportError, Importer};
pub use local::{LocalImportConn, LocalImporter};
pub use source::ScriptOrigin;
