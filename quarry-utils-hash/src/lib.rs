//! Digest algorithms and streaming hashers.
//!
//! Everything that hashes bytes in the engine goes through this crate:
//! one-shot digests, incremental contexts, and the write-through
//! [`HashingWriter`] that lets archive serialization and hashing share
//! a single pass over the data.

use std::fmt;
use std::io::{self, Write};

use ring::digest;
use thiserror::Error;

mod algo;

pub use algo::{Algorithm, UnknownAlgorithm};

const LARGEST_ALGORITHM: Algorithm = Algorithm::LARGEST;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("digest has wrong length {length} != {} for '{algorithm}'", algorithm.size())]
pub struct InvalidDigestError {
    algorithm: Algorithm,
    length: usize,
}

/// A digest value tagged with its algorithm.
///
/// Stored inline in a fixed buffer sized for the largest supported
/// algorithm, so `Hash` is `Copy` and usable as a map key.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Hash {
    algorithm: Algorithm,
    data: [u8; LARGEST_ALGORITHM.size()],
}

impl Hash {
    /// Wraps a raw digest. `digest` must be exactly `algorithm.size()`
    /// bytes long.
    pub fn from_slice(algorithm: Algorithm, digest: &[u8]) -> Result<Hash, InvalidDigestError> {
        if digest.len() != algorithm.size() {
            return Err(InvalidDigestError {
                algorithm,
                length: digest.len(),
            });
        }
        let mut data = [0u8; LARGEST_ALGORITHM.size()];
        data[..digest.len()].copy_from_slice(digest);
        Ok(Hash { algorithm, data })
    }

    #[inline]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.data[..self.algorithm.size()]
    }

    /// Lowercase hex, digest bytes only.
    pub fn to_base16(&self) -> String {
        hex::encode(self.digest_bytes())
    }

    /// Store base32, digest bytes only.
    pub fn to_base32(&self) -> String {
        quarry_utils_base_encoding::encode_string(self.digest_bytes())
    }

    /// Parses `"<algorithm>:<digest>"` where the digest is either hex
    /// or store base32, distinguished by length.
    pub fn parse(s: &str) -> Result<Hash, ParseHashError> {
        let (algo_str, digest_str) = s
            .split_once(':')
            .ok_or_else(|| ParseHashError::MissingAlgorithm(s.to_owned()))?;
        let algorithm: Algorithm = algo_str.parse()?;
        Self::parse_bare(algorithm, digest_str)
    }

    /// Parses a digest without an algorithm prefix, hex or store
    /// base32 by length.
    pub fn parse_bare(algorithm: Algorithm, digest_str: &str) -> Result<Hash, ParseHashError> {
        let digest = if digest_str.len() == algorithm.base16_len() {
            hex::decode(digest_str)
                .map_err(|e| ParseHashError::Encoding(algorithm, e.to_string()))?
        } else if digest_str.len() == algorithm.base32_len() {
            quarry_utils_base_encoding::decode(digest_str.as_bytes())
                .map_err(|e| ParseHashError::Encoding(algorithm, e.to_string()))?
        } else {
            return Err(ParseHashError::WrongLength {
                algorithm,
                length: digest_str.len(),
            });
        };
        Hash::from_slice(algorithm, &digest).map_err(ParseHashError::from)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.digest_bytes()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_base16())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseHashError {
    #[error("hash {0:?} is missing an algorithm prefix")]
    MissingAlgorithm(String),
    #[error(transparent)]
    UnknownAlgorithm(#[from] UnknownAlgorithm),
    #[error("digest length {length} fits neither hex nor base32 for '{algorithm}'")]
    WrongLength { algorithm: Algorithm, length: usize },
    #[error("decoding {0} digest: {1}")]
    Encoding(Algorithm, String),
    #[error(transparent)]
    InvalidDigest(#[from] InvalidDigestError),
}

/// A SHA-256 digest. Separate from [`Hash`] for the places where the
/// store model requires this algorithm and no other (text content
/// addresses, archive hashes).
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Sha256([u8; Algorithm::Sha256.size()]);

impl Sha256 {
    /// One-shot digest of `data`.
    pub fn digest<B: AsRef<[u8]>>(data: B) -> Sha256 {
        let d = digest::digest(&digest::SHA256, data.as_ref());
        let mut out = [0u8; Algorithm::Sha256.size()];
        out.copy_from_slice(d.as_ref());
        Sha256(out)
    }

    pub fn from_slice(digest: &[u8]) -> Result<Sha256, InvalidDigestError> {
        Hash::from_slice(Algorithm::Sha256, digest).map(|h| {
            h.try_into()
                .expect("hash constructed with the sha256 algorithm")
        })
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base16(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_base32(&self) -> String {
        quarry_utils_base_encoding::encode_string(&self.0)
    }
}

impl fmt::Debug for Sha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256(sha256:{})", self.to_base16())
    }
}

impl From<Sha256> for Hash {
    fn from(value: Sha256) -> Hash {
        Hash::from_slice(Algorithm::Sha256, &value.0).expect("sha256 digest size")
    }
}

impl TryFrom<Hash> for Sha256 {
    type Error = AlgorithmMismatch;

    fn try_from(value: Hash) -> Result<Sha256, AlgorithmMismatch> {
        if value.algorithm() != Algorithm::Sha256 {
            return Err(AlgorithmMismatch {
                expected: Algorithm::Sha256,
                actual: value.algorithm(),
            });
        }
        let mut out = [0u8; Algorithm::Sha256.size()];
        out.copy_from_slice(value.digest_bytes());
        Ok(Sha256(out))
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("expected a {expected} hash, got {actual}")]
pub struct AlgorithmMismatch {
    pub expected: Algorithm,
    pub actual: Algorithm,
}

enum InnerContext {
    Ring(digest::Context),
    // MD5 only ever appears in parsed fixed-output assertions, never on
    // the streaming paths, so buffering the input is fine.
    Md5(Vec<u8>),
}

/// Incremental (init/update/finish) digest computation.
pub struct Context {
    algorithm: Algorithm,
    inner: InnerContext,
}

impl Context {
    pub fn new(algorithm: Algorithm) -> Context {
        let inner = match algorithm {
            Algorithm::Md5 => InnerContext::Md5(Vec::new()),
            _ => InnerContext::Ring(digest::Context::new(algorithm.digest_algorithm())),
        };
        Context { algorithm, inner }
    }

    pub fn update<D: AsRef<[u8]>>(&mut self, data: D) {
        match &mut self.inner {
            InnerContext::Ring(ctx) => ctx.update(data.as_ref()),
            InnerContext::Md5(buf) => buf.extend_from_slice(data.as_ref()),
        }
    }

    pub fn finish(self) -> Hash {
        let digest = match self.inner {
            InnerContext::Ring(ctx) => ctx.finish().as_ref().to_vec(),
            InnerContext::Md5(buf) => md5::compute(&buf).0.to_vec(),
        };
        Hash::from_slice(self.algorithm, &digest).expect("digest size matches algorithm")
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.algorithm).finish()
    }
}

/// A [`Write`] adapter that hashes everything passing through it.
///
/// Wrap the destination, write as usual, then [`finish`] to recover the
/// destination together with the byte count and digest. This is how the
/// archive hash is known the moment serialization ends, without a
/// second pass over the data.
///
/// [`finish`]: HashingWriter::finish
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    context: Context,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, algorithm: Algorithm) -> HashingWriter<W> {
        HashingWriter {
            inner,
            context: Context::new(algorithm),
            written: 0,
        }
    }

    /// Returns the destination, the number of bytes written, and the
    /// digest of those bytes.
    pub fn finish(self) -> (W, u64, Hash) {
        (self.inner, self.written, self.context.finish())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.context.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
