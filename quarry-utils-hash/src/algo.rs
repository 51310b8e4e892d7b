use std::fmt;
use std::str::FromStr;

use ring::digest;
use thiserror::Error;

use crate::Hash;

/// Digest algorithms understood by the store.
///
/// SHA-256 is the native algorithm; the others only appear inside
/// fixed-output assertions carried by derivations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    pub(crate) const LARGEST: Algorithm = Algorithm::Sha512;

    pub const fn name(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// Digest size in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Algorithm::Md5 => 16,
            Algorithm::Sha1 => 20,
            Algorithm::Sha256 => 32,
            Algorithm::Sha512 => 64,
        }
    }

    pub const fn base16_len(&self) -> usize {
        self.size() * 2
    }

    pub const fn base32_len(&self) -> usize {
        quarry_utils_base_encoding::encode_len(self.size())
    }

    pub(crate) fn digest_algorithm(&self) -> &'static digest::Algorithm {
        match self {
            Algorithm::Md5 => unreachable!("md5 is not backed by ring"),
            Algorithm::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Algorithm::Sha256 => &digest::SHA256,
            Algorithm::Sha512 => &digest::SHA512,
        }
    }

    /// One-shot digest of `data`.
    pub fn digest<B: AsRef<[u8]>>(&self, data: B) -> Hash {
        let mut ctx = crate::Context::new(*self);
        ctx.update(data);
        ctx.finish()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Algorithm, UnknownAlgorithm> {
        if s.eq_ignore_ascii_case("md5") {
            Ok(Algorithm::Md5)
        } else if s.eq_ignore_ascii_case("sha1") {
            Ok(Algorithm::Sha1)
        } else if s.eq_ignore_ascii_case("sha256") {
            Ok(Algorithm::Sha256)
        } else if s.eq_ignore_ascii_case("sha512") {
            Ok(Algorithm::Sha512)
        } else {
            Err(UnknownAlgorithm(s.to_owned()))
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("unknown hash algorithm '{0}'")]
pub struct UnknownAlgorithm(pub String);

#[cfg(test)]
mod unittests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::md5("md5", Algorithm::Md5)]
    #[case::sha1("sha1", Algorithm::Sha1)]
    #[case::sha256("sha256", Algorithm::Sha256)]
    #[case::sha512("sha512", Algorithm::Sha512)]
    #[case::mixed_case("ShA256", Algorithm::Sha256)]
    fn from_str(#[case] input: &str, #[case] expected: Algorithm) {
        assert_eq!(input.parse::<Algorithm>().unwrap(), expected);
    }

    #[test]
    fn from_str_unknown() {
        assert_eq!(
            "sha384".parse::<Algorithm>(),
            Err(UnknownAlgorithm("sha384".into()))
        );
    }

    #[rstest]
    #[case::md5(Algorithm::Md5, 16, 32, 26)]
    #[case::sha1(Algorithm::Sha1, 20, 40, 32)]
    #[case::sha256(Algorithm::Sha256, 32, 64, 52)]
    #[case::sha512(Algorithm::Sha512, 64, 128, 103)]
    fn sizes(
        #[case] algorithm: Algorithm,
        #[case] size: usize,
        #[case] base16_len: usize,
        #[case] base32_len: usize,
    ) {
        assert_eq!(algorithm.size(), size);
        assert_eq!(algorithm.base16_len(), base16_len);
        assert_eq!(algorithm.base32_len(), base32_len);
    }
}
