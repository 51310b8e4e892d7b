use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::store_path::{ParseStorePathError, StorePath};

/// The configured directory that all store objects live beneath,
/// e.g. `/zb/store`.
///
/// Passed around as an explicit handle; there is no process-global
/// store directory.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreDir(String);

impl StoreDir {
    pub fn new(dir: impl Into<String>) -> Result<StoreDir, StoreDirError> {
        let dir = dir.into();
        if !dir.starts_with('/') {
            return Err(StoreDirError::NotAbsolute(dir));
        }
        if dir.len() < 2 || dir.ends_with('/') {
            return Err(StoreDirError::TrailingSlash(dir));
        }
        Ok(StoreDir(dir))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the store path for an object base name (`<digest>-<name>`).
    pub fn object(&self, base: &str) -> Result<StorePath, ParseStorePathError> {
        StorePath::parse(&format!("{}/{}", self.0, base))
    }

    /// Parses a store path and checks it lives in this directory.
    pub fn parse(&self, s: &str) -> Result<StorePath, ParseStorePathError> {
        let path = StorePath::parse(s)?;
        if path.dir() != self.0 {
            return Err(ParseStorePathError::DirMismatch {
                path: s.to_owned(),
                dir: self.0.clone(),
            });
        }
        Ok(path)
    }

    /// Reports whether `path` lives directly in this directory.
    pub fn contains(&self, path: &StorePath) -> bool {
        path.dir() == self.0
    }
}

impl fmt::Display for StoreDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StoreDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreDir({})", self.0)
    }
}

impl FromStr for StoreDir {
    type Err = StoreDirError;

    fn from_str(s: &str) -> Result<StoreDir, StoreDirError> {
        StoreDir::new(s)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreDirError {
    #[error("store directory {0:?} is not absolute")]
    NotAbsolute(String),
    #[error("store directory {0:?} must not end with a slash")]
    TrailingSlash(String),
}
