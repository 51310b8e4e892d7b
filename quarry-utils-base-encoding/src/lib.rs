//! Nix-compatible base32 encoding.
//!
//! Store path digests use a 32-character alphabet that omits `e`, `o`,
//! `u` and `t`, encodes least-significant bits first, and renders the
//! resulting string reversed. Every digest the engine emits goes
//! through this module, so the alphabet constant below is the canonical
//! one for the whole workspace.

pub mod base32;

pub use base32::{decode, encode_len, encode_string, is_base32_digit, DecodeBase32Error, ALPHABET};
