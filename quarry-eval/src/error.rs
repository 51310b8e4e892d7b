use std::io;
use std::path::PathBuf;

use thiserror::Error;

use quarry_store_core::derivation::MarshalDerivationError;
use quarry_store_core::{FingerprintError, ParseStorePathError, StoreDir};

use crate::import::ImportError;

/// Failure of an import primitive. Whatever went wrong, transient
/// state (the walk relation, the import connection) has been released
/// by the time this reaches the caller; nothing is retried internally.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("resolve path {0:?}: no caller information available")]
    NoCallerContext(String),

    #[error("resolve path {path:?}: {source}")]
    ResolvePath {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("walk {0}: path is not valid UTF-8")]
    NonUtf8Path(PathBuf),

    #[error("{path} is neither a regular file, a directory nor a symlink (mode {mode:o})")]
    UnsupportedFileType { path: PathBuf, mode: u32 },

    #[error("{path} changed size during import (recorded {recorded} bytes, read {read})")]
    SizeChanged {
        path: PathBuf,
        recorded: u64,
        read: u64,
    },

    #[error("read {path}: {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("toFile {name:?}: cannot depend on derivation outputs")]
    OutputDependency { name: String },

    #[error("derivation belongs to {actual}, this evaluator uses {expected}")]
    StoreDirMismatch { expected: StoreDir, actual: StoreDir },

    #[error("cache: {0}")]
    Cache(#[from] quarry_store_db::Error),

    #[error("archive: {0}")]
    Archive(#[from] quarry_nar::NarError),

    #[error("store: {0}")]
    Import(#[from] ImportError),

    #[error(transparent)]
    StorePath(#[from] ParseStorePathError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Derivation(#[from] MarshalDerivationError),
}
