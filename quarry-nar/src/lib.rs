//! NAR (Nix ARchive) format handling.
//!
//! A NAR is a canonical, self-describing serialization of a single
//! filesystem subtree (regular file, symlink, or directory). Because
//! store object identity is derived from the hash of this byte stream,
//! the encoding must be canonical: directory entries appear in strict
//! lexicographic order and every string is length-prefixed and padded
//! to 8 bytes. Bit-exact compatibility with Nix's archive format is a
//! hard requirement.
//!
//! # Key pieces
//!
//! - [`NarWriter`]: streaming serializer driven by [`Header`] values,
//!   with payloads written through [`std::io::Write`]. Rejects
//!   out-of-order entries instead of reordering them.
//! - [`restore`]: streaming parser that materializes an archive under a
//!   target path, validating the same grammar on the way in.
//! - [`export`]: framing for the store import stream that carries a NAR
//!   followed by a trailer naming the destination store path.

pub mod export;
mod restorer;
pub mod wire;
mod writer;

pub use restorer::restore;
pub use writer::{write_single_file, EntryKind, Header, NarWriter};

use thiserror::Error;

/// The self-describing magic token that opens every archive.
pub const NAR_MAGIC: &[u8] = b"nix-archive-1";

/// Errors for both directions of the codec.
#[derive(Debug, Error)]
pub enum NarError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("archive must begin with the root entry, got {0:?}")]
    RootExpected(String),

    #[error("{name:?} is not a valid entry name")]
    InvalidName { name: String },

    #[error("entry {name:?} in {dir:?} is not sorted after {prev:?}")]
    OutOfOrder {
        dir: String,
        prev: String,
        name: String,
    },

    #[error("{path:?} is not inside an open directory")]
    OrphanEntry { path: String },

    #[error("the root entry is a leaf; no further entries are allowed")]
    TrailingEntry,

    #[error("file payload incomplete: {remaining} bytes missing")]
    IncompletePayload { remaining: u64 },

    #[error("payload exceeds the declared file size")]
    PayloadOverrun,

    #[error("archive does not start with the nix-archive-1 magic")]
    BadMagic,

    #[error("expected {expected}, got token {got:?}")]
    UnexpectedToken { expected: &'static str, got: String },

    #[error("token of {0} bytes exceeds the decoder limit")]
    TokenTooLong(u64),

    #[error("string padding contains non-zero bytes")]
    BadPadding,

    #[error("no entries were written to the archive")]
    Empty,
}
