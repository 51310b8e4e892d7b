use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use quarry_utils_base_encoding::is_base32_digit;

/// Length of the digest component: 32 base32 characters encoding the
/// 20-byte compressed fingerprint.
pub const DIGEST_LEN: usize = 32;

/// File extension of serialized derivations.
pub const DERIVATION_EXT: &str = ".drv";

/// An absolute path of the form `<dir>/<digest>-<name>`.
///
/// A store path is an opaque identity: two paths are equal iff their
/// strings are byte-equal. Construction validates the shape, so every
/// `StorePath` in the program is well-formed.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    path: String,
}

impl StorePath {
    /// Parses an absolute store path, validating digest and name.
    pub fn parse(s: &str) -> Result<StorePath, ParseStorePathError> {
        if !s.starts_with('/') {
            return Err(ParseStorePathError::NotAbsolute(s.to_owned()));
        }
        let sep = s.rfind('/').expect("absolute path contains a slash");
        if sep == 0 {
            return Err(ParseStorePathError::MissingDirectory(s.to_owned()));
        }
        let base = &s[sep + 1..];
        if base.len() < DIGEST_LEN + 2 || base.as_bytes().get(DIGEST_LEN) != Some(&b'-') {
            return Err(ParseStorePathError::InvalidDigest(s.to_owned()));
        }
        if !base[..DIGEST_LEN].bytes().all(is_base32_digit) {
            return Err(ParseStorePathError::InvalidDigest(s.to_owned()));
        }
        validate_name(&base[DIGEST_LEN + 1..])?;
        Ok(StorePath { path: s.to_owned() })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    fn base_offset(&self) -> usize {
        self.path.rfind('/').expect("validated store path") + 1
    }

    /// The directory component, without a trailing slash.
    pub fn dir(&self) -> &str {
        &self.path[..self.base_offset() - 1]
    }

    /// The `<digest>-<name>` component.
    pub fn base(&self) -> &str {
        &self.path[self.base_offset()..]
    }

    /// The 32-character base32 digest.
    pub fn digest(&self) -> &str {
        let start = self.base_offset();
        &self.path[start..start + DIGEST_LEN]
    }

    /// The human-readable name after the digest.
    pub fn name(&self) -> &str {
        &self.path[self.base_offset() + DIGEST_LEN + 1..]
    }

    /// Reports whether this path names a serialized derivation.
    pub fn is_derivation(&self) -> bool {
        self.name().ends_with(DERIVATION_EXT)
    }

    /// The name with the `.drv` extension stripped, if present.
    pub fn derivation_name(&self) -> Option<&str> {
        self.name().strip_suffix(DERIVATION_EXT)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl fmt::Debug for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePath({})", self.path)
    }
}

impl AsRef<str> for StorePath {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

impl FromStr for StorePath {
    type Err = ParseStorePathError;

    fn from_str(s: &str) -> Result<StorePath, ParseStorePathError> {
        StorePath::parse(s)
    }
}

/// Validates an object name: `[A-Za-z0-9+\-._?=]+`, no leading dot.
pub fn validate_name(name: &str) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }
    if name.starts_with('.') {
        return Err(InvalidNameError::LeadingDot(name.to_owned()));
    }
    for b in name.bytes() {
        if !(b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.' | b'_' | b'?' | b'=')) {
            return Err(InvalidNameError::ForbiddenCharacter {
                name: name.to_owned(),
                character: b as char,
            });
        }
    }
    Ok(())
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidNameError {
    #[error("object name is empty")]
    Empty,
    #[error("object name {0:?} starts with a dot")]
    LeadingDot(String),
    #[error("object name {name:?} contains forbidden character {character:?}")]
    ForbiddenCharacter { name: String, character: char },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseStorePathError {
    #[error("store path {0:?} is not absolute")]
    NotAbsolute(String),
    #[error("store path {0:?} has no directory component")]
    MissingDirectory(String),
    #[error("store path {0:?} does not start with a {DIGEST_LEN}-character digest")]
    InvalidDigest(String),
    #[error(transparent)]
    InvalidName(#[from] InvalidNameError),
    #[error("store path {path:?} is not in store directory {dir:?}")]
    DirMismatch { path: String, dir: String },
}
