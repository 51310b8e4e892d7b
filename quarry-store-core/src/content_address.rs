use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

use quarry_utils_hash::{Algorithm, Hash, ParseHashError, Sha256};

/// How a filesystem object is turned into bytes for hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum IngestionMethod {
    /// A single regular file, hashed as-is.
    #[display("flat")]
    Flat,
    /// An arbitrary subtree, hashed over its archive serialization.
    #[display("recursive")]
    Recursive,
}

impl IngestionMethod {
    /// The prefix used in hash-algorithm tags (`""` or `"r:"`).
    pub fn prefix(&self) -> &'static str {
        match self {
            IngestionMethod::Flat => "",
            IngestionMethod::Recursive => "r:",
        }
    }
}

/// The content-address assertion of a store object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum ContentAddress {
    /// Plain textual object (derivations, file literals). Always SHA-256.
    #[display("text:sha256:{}", _0.to_base32())]
    Text(Sha256),
    /// A single regular file hashed directly.
    #[display("fixed:{}:{}", _0.algorithm(), _0.to_base32())]
    Flat(Hash),
    /// A subtree hashed over its archive serialization.
    #[display("fixed:r:{}:{}", _0.algorithm(), _0.to_base32())]
    Recursive(Hash),
}

impl ContentAddress {
    pub fn hash(&self) -> Hash {
        match *self {
            ContentAddress::Text(h) => h.into(),
            ContentAddress::Flat(h) | ContentAddress::Recursive(h) => h,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.hash().algorithm()
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentAddress::Text(_))
    }

    /// The method prefix used when building hash-algorithm tags:
    /// `"text:"`, `""`, or `"r:"`.
    pub fn method_prefix(&self) -> &'static str {
        match self {
            ContentAddress::Text(_) => "text:",
            ContentAddress::Flat(_) => "",
            ContentAddress::Recursive(_) => "r:",
        }
    }

    /// The `<method><algorithm>` tag, e.g. `r:sha256` or `text:sha256`.
    pub fn ca_tag(&self) -> String {
        format!("{}{}", self.method_prefix(), self.algorithm())
    }
}

impl FromStr for ContentAddress {
    type Err = ParseContentAddressError;

    fn from_str(s: &str) -> Result<ContentAddress, ParseContentAddressError> {
        if let Some(rest) = s.strip_prefix("text:sha256:") {
            let hash = Hash::parse_bare(Algorithm::Sha256, rest)?;
            let sha256 = hash.try_into().expect("parsed with the sha256 algorithm");
            Ok(ContentAddress::Text(sha256))
        } else if let Some(rest) = s.strip_prefix("fixed:r:") {
            parse_tagged_hash(rest).map(ContentAddress::Recursive)
        } else if let Some(rest) = s.strip_prefix("fixed:") {
            parse_tagged_hash(rest).map(ContentAddress::Flat)
        } else {
            Err(ParseContentAddressError::InvalidForm(s.to_owned()))
        }
    }
}

fn parse_tagged_hash(s: &str) -> Result<Hash, ParseContentAddressError> {
    let (algo_str, digest_str) = s
        .split_once(':')
        .ok_or_else(|| ParseContentAddressError::InvalidForm(s.to_owned()))?;
    let algorithm: Algorithm = algo_str
        .parse()
        .map_err(ParseHashError::UnknownAlgorithm)?;
    Ok(Hash::parse_bare(algorithm, digest_str)?)
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseContentAddressError {
    #[error("{0:?} is not of the form 'text:…' or 'fixed:…'")]
    InvalidForm(String),
    #[error(transparent)]
    InvalidHash(#[from] ParseHashError),
}

#[cfg(test)]
mod unittests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::text(
        ContentAddress::Text(Sha256::digest("abc")),
        "text:sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s"
    )]
    #[case::flat(
        ContentAddress::Flat(Algorithm::Sha256.digest("abc")),
        "fixed:sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s"
    )]
    #[case::recursive(
        ContentAddress::Recursive(Algorithm::Sha256.digest("abc")),
        "fixed:r:sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s"
    )]
    #[case::recursive_sha1(
        ContentAddress::Recursive(Algorithm::Sha1.digest("abc")),
        "fixed:r:sha1:kpcd173cq987hw957sx6m0868wv3x6d9"
    )]
    fn display_and_parse(#[case] ca: ContentAddress, #[case] rendered: &str) {
        assert_eq!(ca.to_string(), rendered);
        assert_eq!(rendered.parse::<ContentAddress>().unwrap(), ca);
    }

    #[rstest]
    #[case::tag_text(ContentAddress::Text(Sha256::digest("abc")), "text:sha256")]
    #[case::tag_flat(ContentAddress::Flat(Algorithm::Sha1.digest("abc")), "sha1")]
    #[case::tag_recursive(ContentAddress::Recursive(Algorithm::Sha256.digest("abc")), "r:sha256")]
    fn ca_tags(#[case] ca: ContentAddress, #[case] tag: &str) {
        assert_eq!(ca.ca_tag(), tag);
    }

    #[rstest]
    #[case::unknown_form("source:sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s")]
    #[case::text_non_sha256("text:sha1:kpcd173cq987hw957sx6m0868wv3x6d9")]
    #[case::truncated("fixed:sha256:1b8m03r63zqhnjf7l5wnldhh")]
    fn parse_rejects(#[case] input: &str) {
        assert!(input.parse::<ContentAddress>().is_err());
    }
}
