//! Wire primitives shared by the archive codec and the export framing.
//!
//! Integers are 64-bit little-endian. Strings are an integer length
//! followed by the bytes, zero-padded to the next 8-byte boundary.

use std::io::{self, Read, Write};

use crate::NarError;

/// Zero padding needed after `len` payload bytes.
pub const fn pad_len(len: u64) -> usize {
    ((8 - len % 8) % 8) as usize
}

pub fn write_u64<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u64(w, bytes.len() as u64)?;
    w.write_all(bytes)?;
    w.write_all(&[0u8; 8][..pad_len(bytes.len() as u64)])
}

pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads a length-prefixed padded string of at most `max_len` bytes.
pub fn read_bytes<R: Read>(r: &mut R, max_len: u64) -> Result<Vec<u8>, NarError> {
    let len = read_u64(r)?;
    if len > max_len {
        return Err(NarError::TokenTooLong(len));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    read_padding(r, len)?;
    Ok(buf)
}

/// Consumes and validates the zero padding after `len` payload bytes.
pub fn read_padding<R: Read>(r: &mut R, len: u64) -> Result<(), NarError> {
    let mut pad = [0u8; 8];
    let n = pad_len(len);
    r.read_exact(&mut pad[..n])?;
    if pad[..n].iter().any(|&b| b != 0) {
        return Err(NarError::BadPadding);
    }
    Ok(())
}
