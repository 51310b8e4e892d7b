use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::trace;

use crate::wire::{read_bytes, read_padding, read_u64};
use crate::writer::validate_name;
use crate::{NarError, NAR_MAGIC};

/// Upper bound for structural tokens (type tags, entry names, symlink
/// targets). File contents are streamed and not subject to it.
const MAX_TOKEN: u64 = 4096;

/// Parses an archive from `r` and materializes it at `dest`.
///
/// `dest` must not exist yet. The parser enforces the same grammar the
/// writer emits, including strict entry ordering, so a tampered archive
/// fails instead of silently producing a differently-hashed tree.
/// Trailing bytes after the archive are left unread, which lets the
/// caller parse surrounding framing.
pub fn restore<R: Read>(mut r: R, dest: &Path) -> Result<(), NarError> {
    let magic = read_bytes(&mut r, MAX_TOKEN)?;
    if magic != NAR_MAGIC {
        return Err(NarError::BadMagic);
    }
    restore_node(&mut r, dest)
}

fn restore_node<R: Read>(r: &mut R, dest: &Path) -> Result<(), NarError> {
    expect_token(r, b"(", "'('")?;
    expect_token(r, b"type", "'type'")?;
    let kind = read_bytes(r, MAX_TOKEN)?;
    match kind.as_slice() {
        b"regular" => restore_regular(r, dest),
        b"symlink" => restore_symlink(r, dest),
        b"directory" => restore_directory(r, dest),
        other => Err(unexpected("a node type", other)),
    }
}

fn restore_regular<R: Read>(r: &mut R, dest: &Path) -> Result<(), NarError> {
    let mut executable = false;
    let mut token = read_bytes(r, MAX_TOKEN)?;
    if token == b"executable" {
        executable = true;
        expect_token(r, b"", "''")?;
        token = read_bytes(r, MAX_TOKEN)?;
    }
    if token != b"contents" {
        return Err(unexpected("'contents'", &token));
    }

    let size = read_u64(r)?;
    trace!(path = %dest.display(), size, "restoring file");
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(if executable { 0o777 } else { 0o666 })
        .open(dest)?;
    let copied = io::copy(&mut r.by_ref().take(size), &mut file)?;
    if copied != size {
        return Err(NarError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "file contents ended early",
        )));
    }
    file.flush()?;
    read_padding(r, size)?;
    expect_token(r, b")", "')'")
}

fn restore_symlink<R: Read>(r: &mut R, dest: &Path) -> Result<(), NarError> {
    expect_token(r, b"target", "'target'")?;
    let target = read_bytes(r, MAX_TOKEN)?;
    let target = String::from_utf8(target).map_err(|e| NarError::InvalidName {
        name: String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })?;
    trace!(path = %dest.display(), target, "restoring symlink");
    std::os::unix::fs::symlink(&target, dest)?;
    expect_token(r, b")", "')'")
}

fn restore_directory<R: Read>(r: &mut R, dest: &Path) -> Result<(), NarError> {
    fs::create_dir(dest)?;
    let mut last_name: Option<String> = None;
    loop {
        let token = read_bytes(r, MAX_TOKEN)?;
        match token.as_slice() {
            b")" => return Ok(()),
            b"entry" => {}
            other => return Err(unexpected("'entry' or ')'", other)),
        }
        expect_token(r, b"(", "'('")?;
        expect_token(r, b"name", "'name'")?;
        let name_bytes = read_bytes(r, MAX_TOKEN)?;
        let name = String::from_utf8(name_bytes).map_err(|e| NarError::InvalidName {
            name: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })?;
        validate_name(&name)?;
        if let Some(prev) = &last_name {
            if name.as_str() <= prev.as_str() {
                return Err(NarError::OutOfOrder {
                    dir: dest.display().to_string(),
                    prev: prev.clone(),
                    name,
                });
            }
        }
        expect_token(r, b"node", "'node'")?;
        restore_node(r, &dest.join(&name))?;
        expect_token(r, b")", "')'")?;
        last_name = Some(name);
    }
}

fn expect_token<R: Read>(
    r: &mut R,
    expected: &'static [u8],
    what: &'static str,
) -> Result<(), NarError> {
    let token = read_bytes(r, MAX_TOKEN)?;
    if token != expected {
        return Err(unexpected(what, &token));
    }
    Ok(())
}

fn unexpected(expected: &'static str, got: &[u8]) -> NarError {
    NarError::UnexpectedToken {
        expected,
        got: String::from_utf8_lossy(got).into_owned(),
    }
}
