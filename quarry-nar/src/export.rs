//! Framing for the store import stream.
//!
//! An import sends one or more objects, each framed as a `1` marker,
//! the NAR bytes, and a trailer naming the destination store path with
//! its references and optional deriver. A `0` marker ends the stream.
//! Closing the connection without a trailer is how an import is
//! aborted; the endpoint discards everything received so far.

use std::io::{self, Write};

use crate::wire::{write_bytes, write_u64};

/// Trailer magic, `NIXE` in little-endian.
pub const EXPORT_MAGIC: u64 = 0x4558494e;

/// Marks the start of one exported object. The NAR bytes follow.
pub fn begin_object<W: Write>(w: &mut W) -> io::Result<()> {
    write_u64(w, 1)
}

/// Writes the trailer for the object whose NAR bytes just ended.
pub fn write_trailer<W: Write>(
    w: &mut W,
    store_path: &str,
    references: &[&str],
    deriver: &str,
) -> io::Result<()> {
    write_u64(w, EXPORT_MAGIC)?;
    write_bytes(w, store_path.as_bytes())?;
    write_u64(w, references.len() as u64)?;
    for reference in references {
        write_bytes(w, reference.as_bytes())?;
    }
    write_bytes(w, deriver.as_bytes())?;
    // No signature block.
    write_u64(w, 0)
}

/// Ends the stream after the last object.
pub fn end_stream<W: Write>(w: &mut W) -> io::Result<()> {
    write_u64(w, 0)
}
