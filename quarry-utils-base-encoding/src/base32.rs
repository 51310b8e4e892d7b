use std::sync::LazyLock;

use data_encoding::{BitOrder, Encoding, Specification};

/// The 32-character alphabet used by store digests.
///
/// Omits E, O, U and T to avoid accidental words and visual ambiguity.
pub const ALPHABET: &str = "0123456789abcdfghijklmnpqrsvwxyz";

/// Base32 with the store alphabet, least-significant bits first and no
/// padding. The rendered string is additionally reversed, which
/// [`encode_string`] and [`decode`] take care of.
static STORE_BASE32: LazyLock<Encoding> = LazyLock::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str(ALPHABET);
    spec.bit_order = BitOrder::LeastSignificantFirst;
    spec.encoding().expect("valid base32 specification")
});

/// Encoded length for `len` input bytes (no padding).
pub const fn encode_len(len: usize) -> usize {
    (8 * len).div_ceil(5)
}

/// Reports whether `b` is a character of the store base32 alphabet.
pub fn is_base32_digit(b: u8) -> bool {
    ALPHABET.as_bytes().contains(&b)
}

/// Encodes `input` in store base32.
pub fn encode_string(input: &[u8]) -> String {
    let encoded = STORE_BASE32.encode(input);
    // The on-disk form is the little-endian encoding read back to front.
    encoded.chars().rev().collect()
}

/// Decodes a store base32 string back to bytes.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, DecodeBase32Error> {
    let mut reversed = input.to_vec();
    reversed.reverse();
    STORE_BASE32
        .decode(&reversed)
        .map_err(|source| DecodeBase32Error {
            // Positions refer to the string as written, not as decoded.
            position: input.len().saturating_sub(source.position + 1),
            source,
        })
}

/// Error decoding a store base32 string.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid base32 at offset {position}: {source}")]
pub struct DecodeBase32Error {
    /// Byte offset of the offending character in the original input.
    pub position: usize,
    #[source]
    source: data_encoding::DecodeError,
}


#[cfg(test)]
mod proptests {
    use proptest::{prop_assert_eq, proptest};

    use super::*;

    proptest! {
        #[test]
        fn proptest_roundtrip(data: Vec<u8>) {
            let encoded = encode_string(&data);
            prop_assert_eq!(encoded.len(), encode_len(data.len()));
            let decoded = decode(encoded.as_bytes()).unwrap();
            prop_assert_eq!(data, decoded);
        }
    }
}
