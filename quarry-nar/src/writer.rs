use std::io::{self, Write};

use crate::wire::{self, pad_len};
use crate::{NarError, NAR_MAGIC};

/// What a [`Header`] announces at its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Regular { executable: bool, size: u64 },
    Symlink { target: String },
    Directory,
}

/// One entry of the subtree being archived.
///
/// `path` is slash-separated and relative to the archive root; the
/// root itself uses the empty string. Directories must be announced
/// before their children, and siblings must arrive in ascending
/// byte order of their names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub path: String,
    pub kind: EntryKind,
}

#[derive(Debug)]
struct DirFrame {
    path: String,
    last_name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum State {
    /// Nothing written yet.
    Fresh,
    /// Between nodes; the directory stack gives the context.
    Open,
    /// Streaming a regular file payload.
    InFile {
        remaining: u64,
        size: u64,
        entry_wrapped: bool,
    },
    /// The root was a leaf (file or symlink) and is complete.
    RootLeafDone,
}

/// Streaming NAR serializer.
///
/// Drive it with [`write_header`] for each entry; regular-file payloads
/// are streamed through the [`Write`] impl and must total exactly the
/// declared size. [`close`] emits the trailing framing and hands back
/// the inner writer, so wrapping the destination in a hashing tee makes
/// the archive hash available immediately afterwards.
///
/// [`write_header`]: NarWriter::write_header
/// [`close`]: NarWriter::close
#[derive(Debug)]
pub struct NarWriter<W> {
    w: W,
    state: State,
    dirs: Vec<DirFrame>,
}

impl<W: Write> NarWriter<W> {
    pub fn new(w: W) -> NarWriter<W> {
        NarWriter {
            w,
            state: State::Fresh,
            dirs: Vec::new(),
        }
    }

    /// Announces the next entry of the archive.
    pub fn write_header(&mut self, header: &Header) -> Result<(), NarError> {
        match self.state {
            State::InFile { remaining, .. } => {
                return Err(NarError::IncompletePayload { remaining });
            }
            State::RootLeafDone => return Err(NarError::TrailingEntry),
            State::Fresh => {
                if !header.path.is_empty() {
                    return Err(NarError::RootExpected(header.path.clone()));
                }
                wire::write_bytes(&mut self.w, NAR_MAGIC)?;
                return self.open_node(header);
            }
            State::Open => {}
        }

        let path = header.path.as_str();
        if path.is_empty() {
            return Err(NarError::OrphanEntry { path: path.into() });
        }
        let (parent, name) = match path.rfind('/') {
            Some(i) => (&path[..i], &path[i + 1..]),
            None => ("", path),
        };
        validate_name(name)?;

        // Close finished directories until the parent is on top.
        loop {
            let top = self.dirs.last().ok_or_else(|| NarError::OrphanEntry {
                path: path.to_owned(),
            })?;
            if top.path == parent {
                break;
            }
            if is_ancestor(&top.path, parent) {
                // An intermediate directory was never announced.
                return Err(NarError::OrphanEntry {
                    path: path.to_owned(),
                });
            }
            self.close_dir()?;
        }

        let top = self.dirs.last_mut().expect("parent directory is open");
        if let Some(prev) = &top.last_name {
            if name <= prev.as_str() {
                return Err(NarError::OutOfOrder {
                    dir: top.path.clone(),
                    prev: prev.clone(),
                    name: name.to_owned(),
                });
            }
        }
        top.last_name = Some(name.to_owned());

        wire::write_bytes(&mut self.w, b"entry")?;
        wire::write_bytes(&mut self.w, b"(")?;
        wire::write_bytes(&mut self.w, b"name")?;
        wire::write_bytes(&mut self.w, name.as_bytes())?;
        wire::write_bytes(&mut self.w, b"node")?;
        self.open_node(header)
    }

    /// Emits the trailing framing and returns the inner writer.
    pub fn close(mut self) -> Result<W, NarError> {
        match self.state {
            State::Fresh => return Err(NarError::Empty),
            State::InFile { remaining, .. } => {
                return Err(NarError::IncompletePayload { remaining });
            }
            State::Open | State::RootLeafDone => {}
        }
        while !self.dirs.is_empty() {
            self.close_dir()?;
        }
        self.w.flush()?;
        Ok(self.w)
    }

    fn open_node(&mut self, header: &Header) -> Result<(), NarError> {
        wire::write_bytes(&mut self.w, b"(")?;
        wire::write_bytes(&mut self.w, b"type")?;
        let entry_wrapped = !header.path.is_empty();
        match &header.kind {
            EntryKind::Directory => {
                wire::write_bytes(&mut self.w, b"directory")?;
                self.dirs.push(DirFrame {
                    path: header.path.clone(),
                    last_name: None,
                });
                self.state = State::Open;
            }
            EntryKind::Symlink { target } => {
                wire::write_bytes(&mut self.w, b"symlink")?;
                wire::write_bytes(&mut self.w, b"target")?;
                wire::write_bytes(&mut self.w, target.as_bytes())?;
                self.finish_node(entry_wrapped)?;
            }
            EntryKind::Regular { executable, size } => {
                wire::write_bytes(&mut self.w, b"regular")?;
                if *executable {
                    wire::write_bytes(&mut self.w, b"executable")?;
                    wire::write_bytes(&mut self.w, b"")?;
                }
                wire::write_bytes(&mut self.w, b"contents")?;
                wire::write_u64(&mut self.w, *size)?;
                if *size == 0 {
                    self.finish_node(entry_wrapped)?;
                } else {
                    self.state = State::InFile {
                        remaining: *size,
                        size: *size,
                        entry_wrapped,
                    };
                }
            }
        }
        Ok(())
    }

    fn finish_node(&mut self, entry_wrapped: bool) -> Result<(), NarError> {
        wire::write_bytes(&mut self.w, b")")?;
        if entry_wrapped {
            wire::write_bytes(&mut self.w, b")")?;
        }
        self.state = if self.dirs.is_empty() {
            State::RootLeafDone
        } else {
            State::Open
        };
        Ok(())
    }

    fn close_dir(&mut self) -> Result<(), NarError> {
        let frame = self.dirs.pop().expect("close_dir needs an open directory");
        wire::write_bytes(&mut self.w, b")")?;
        if !frame.path.is_empty() {
            wire::write_bytes(&mut self.w, b")")?;
        }
        self.state = State::Open;
        Ok(())
    }
}

impl<W: Write> Write for NarWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let State::InFile {
            remaining,
            size,
            entry_wrapped,
        } = self.state
        else {
            return Err(io::Error::other(NarError::PayloadOverrun));
        };
        let n = buf.len().min(remaining as usize);
        self.w.write_all(&buf[..n])?;
        let remaining = remaining - n as u64;
        if remaining == 0 {
            self.w.write_all(&[0u8; 8][..pad_len(size)])?;
            self.finish_node(entry_wrapped).map_err(into_io)?;
        } else {
            self.state = State::InFile {
                remaining,
                size,
                entry_wrapped,
            };
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

/// Serializes `contents` as an archive of a single non-executable
/// regular file at the root. Used for text store objects.
pub fn write_single_file<W: Write>(w: W, contents: &[u8]) -> Result<W, NarError> {
    let mut nar = NarWriter::new(w);
    nar.write_header(&Header {
        path: String::new(),
        kind: EntryKind::Regular {
            executable: false,
            size: contents.len() as u64,
        },
    })?;
    nar.write_all(contents)?;
    nar.close()
}

pub(crate) fn validate_name(name: &str) -> Result<(), NarError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0')
    {
        return Err(NarError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() {
        !path.is_empty()
    } else {
        path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/'
    }
}

fn into_io(err: NarError) -> io::Error {
    match err {
        NarError::Io(err) => err,
        other => io::Error::other(other),
    }
}

#[cfg(test)]
mod unittests {
    use super::*;
    use crate::wire::write_bytes;

    fn header(path: &str, kind: EntryKind) -> Header {
        Header {
            path: path.to_owned(),
            kind,
        }
    }

    fn file(size: u64) -> EntryKind {
        EntryKind::Regular {
            executable: false,
            size,
        }
    }

    #[test]
    fn single_file_golden_bytes() {
        let out = write_single_file(Vec::new(), b"hello\n").unwrap();

        let mut expected = Vec::new();
        for token in [
            b"nix-archive-1".as_slice(),
            b"(",
            b"type",
            b"regular",
            b"contents",
        ] {
            write_bytes(&mut expected, token).unwrap();
        }
        write_bytes(&mut expected, b"hello\n").unwrap();
        write_bytes(&mut expected, b")").unwrap();

        assert_eq!(out, expected);
    }

    #[test]
    fn empty_file_has_no_payload_block() {
        let out = write_single_file(Vec::new(), b"").unwrap();
        let mut expected = Vec::new();
        for token in [
            b"nix-archive-1".as_slice(),
            b"(",
            b"type",
            b"regular",
            b"contents",
        ] {
            write_bytes(&mut expected, token).unwrap();
        }
        expected.extend_from_slice(&0u64.to_le_bytes());
        write_bytes(&mut expected, b")").unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn executable_bit_adds_marker_tokens() {
        let mut nar = NarWriter::new(Vec::new());
        nar.write_header(&header(
            "",
            EntryKind::Regular {
                executable: true,
                size: 2,
            },
        ))
        .unwrap();
        nar.write_all(b"#!").unwrap();
        let out = nar.close().unwrap();

        let mut marker = Vec::new();
        write_bytes(&mut marker, b"executable").unwrap();
        write_bytes(&mut marker, b"").unwrap();
        assert!(out
            .windows(marker.len())
            .any(|window| window == marker.as_slice()));
    }

    #[test]
    fn directory_tree_structure() {
        let mut nar = NarWriter::new(Vec::new());
        nar.write_header(&header("", EntryKind::Directory)).unwrap();
        nar.write_header(&header("a", EntryKind::Directory)).unwrap();
        nar.write_header(&header("a/x", file(3))).unwrap();
        nar.write_all(b"abc").unwrap();
        nar.write_header(&header(
            "b",
            EntryKind::Symlink {
                target: "a/x".into(),
            },
        ))
        .unwrap();
        let out = nar.close().unwrap();

        // The entry for "a" must appear before the entry for "b".
        let mut name_a = Vec::new();
        write_bytes(&mut name_a, b"name").unwrap();
        write_bytes(&mut name_a, b"a").unwrap();
        let mut name_b = Vec::new();
        write_bytes(&mut name_b, b"name").unwrap();
        write_bytes(&mut name_b, b"b").unwrap();
        let pos = |needle: &[u8]| {
            out.windows(needle.len())
                .position(|window| window == needle)
                .unwrap()
        };
        assert!(pos(&name_a) < pos(&name_b));
    }

    #[test]
    fn rejects_out_of_order_entries() {
        let mut nar = NarWriter::new(Vec::new());
        nar.write_header(&header("", EntryKind::Directory)).unwrap();
        nar.write_header(&header("b", file(0))).unwrap();
        let err = nar.write_header(&header("a", file(0))).unwrap_err();
        assert!(matches!(err, NarError::OutOfOrder { .. }));
    }

    #[test]
    fn rejects_duplicate_entries() {
        let mut nar = NarWriter::new(Vec::new());
        nar.write_header(&header("", EntryKind::Directory)).unwrap();
        nar.write_header(&header("a", file(0))).unwrap();
        let err = nar.write_header(&header("a", file(0))).unwrap_err();
        assert!(matches!(err, NarError::OutOfOrder { .. }));
    }

    #[test]
    fn rejects_undeclared_intermediate_directory() {
        let mut nar = NarWriter::new(Vec::new());
        nar.write_header(&header("", EntryKind::Directory)).unwrap();
        let err = nar.write_header(&header("a/x", file(0))).unwrap_err();
        assert!(matches!(err, NarError::OrphanEntry { .. }));
    }

    #[test]
    fn rejects_non_root_start() {
        let mut nar = NarWriter::new(Vec::new());
        let err = nar.write_header(&header("a", file(0))).unwrap_err();
        assert!(matches!(err, NarError::RootExpected(_)));
    }

    #[test]
    fn rejects_entries_after_root_leaf() {
        let mut nar = NarWriter::new(Vec::new());
        nar.write_header(&header("", file(0))).unwrap();
        let err = nar.write_header(&header("a", file(0))).unwrap_err();
        assert!(matches!(err, NarError::TrailingEntry));
    }

    #[test]
    fn incomplete_payload_blocks_headers_and_close() {
        let mut nar = NarWriter::new(Vec::new());
        nar.write_header(&header("", EntryKind::Directory)).unwrap();
        nar.write_header(&header("a", file(4))).unwrap();
        nar.write_all(b"ab").unwrap();
        let err = nar.write_header(&header("b", file(0))).unwrap_err();
        assert!(matches!(err, NarError::IncompletePayload { remaining: 2 }));
        let err = nar.close().unwrap_err();
        assert!(matches!(err, NarError::IncompletePayload { remaining: 2 }));
    }

    #[test]
    fn payload_overrun_is_an_error() {
        let mut nar = NarWriter::new(Vec::new());
        nar.write_header(&header("", file(2))).unwrap();
        let err = nar.write_all(b"abc").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
    }

    #[test]
    fn close_on_empty_writer_fails() {
        let nar = NarWriter::new(Vec::new());
        assert!(matches!(nar.close(), Err(NarError::Empty)));
    }
}
