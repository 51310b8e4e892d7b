use thiserror::Error;

use quarry_utils_base_encoding as base32;
use quarry_utils_hash::{Algorithm, Hash, Sha256};

use crate::content_address::ContentAddress;
use crate::references::References;
use crate::store_dir::StoreDir;
use crate::store_path::ParseStorePathError;
use crate::StorePath;

/// XOR-folds `input` down to `size` bytes: byte *i* of the input is
/// XORed into byte *i* mod `size` of the output.
pub fn compress_hash(input: &[u8], size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    for (i, &b) in input.iter().enumerate() {
        out[i % size] ^= b;
    }
    out
}

/// Computes a store path from its identity fingerprint.
///
/// The fingerprint is the colon-separated concatenation
///
/// ```text
/// <typ>(":" <ref>)*(":self")?":"<algo>":"<base16 hash>":"<dir>":"<name>
/// ```
///
/// with references in ascending order, hashed with SHA-256, XOR-folded
/// to 20 bytes and base32-encoded. This function is the identity axis
/// of the whole store: every byte of its output is significant, and a
/// change here changes every path the system emits.
pub fn make_store_path(
    dir: &StoreDir,
    typ: &str,
    hash: &Hash,
    name: &str,
    refs: &References,
) -> Result<StorePath, FingerprintError> {
    let mut fingerprint = String::with_capacity(128);
    fingerprint.push_str(typ);
    for reference in &refs.others {
        fingerprint.push(':');
        fingerprint.push_str(reference.as_str());
    }
    if refs.self_reference {
        fingerprint.push_str(":self");
    }
    fingerprint.push(':');
    fingerprint.push_str(&hash.to_string());
    fingerprint.push(':');
    fingerprint.push_str(dir.as_str());
    fingerprint.push(':');
    fingerprint.push_str(name);

    let fingerprint_hash = Sha256::digest(&fingerprint);
    let digest = base32::encode_string(&compress_hash(fingerprint_hash.digest_bytes(), 20));
    Ok(dir.object(&format!("{digest}-{name}"))?)
}

/// Computes the store path of a content-addressed object.
///
/// - text objects use the `text` fingerprint class with their
///   references in the body (a self-reference is impossible for text);
/// - recursively-ingested SHA-256 objects use the `source` class;
/// - any other fixed assertion gets the self-contained `output:out`
///   class derived from a nested hash, and cannot carry references.
pub fn fixed_ca_output_path(
    dir: &StoreDir,
    name: &str,
    ca: &ContentAddress,
    refs: &References,
) -> Result<StorePath, FingerprintError> {
    match ca {
        ContentAddress::Text(h) => {
            if refs.self_reference {
                return Err(FingerprintError::TextSelfReference(name.to_owned()));
            }
            make_store_path(dir, "text", &Hash::from(*h), name, refs)
        }
        ContentAddress::Recursive(h) if h.algorithm() == Algorithm::Sha256 => {
            make_store_path(dir, "source", h, name, refs)
        }
        _ => {
            if !refs.is_empty() {
                return Err(FingerprintError::RefsNotAllowed(name.to_owned()));
            }
            let inner = format!("fixed:out:{}{}", ca.method_prefix(), ca.hash());
            let inner_hash = Sha256::digest(inner);
            make_store_path(
                dir,
                "output:out",
                &inner_hash.into(),
                name,
                &References::default(),
            )
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FingerprintError {
    #[error(transparent)]
    StorePath(#[from] ParseStorePathError),
    #[error("text object {0:?} cannot reference itself")]
    TextSelfReference(String),
    #[error("fixed-output path for {0:?} cannot carry references")]
    RefsNotAllowed(String),
}
