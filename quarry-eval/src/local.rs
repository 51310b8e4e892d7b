use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tracing::debug;

use quarry_nar::restore;
use quarry_store_core::StoreDir;

use crate::import::{ExportTrailer, ImportConn, ImportError, Importer};

/// An import endpoint backed by a directory on the local filesystem.
///
/// Received archives are materialized directly under the store
/// directory. Store objects are immutable: a destination that already
/// exists is left untouched.
pub struct LocalImporter {
    store_dir: StoreDir,
}

impl LocalImporter {
    /// Creates the store directory if needed.
    pub fn new(store_dir: StoreDir) -> Result<LocalImporter, ImportError> {
        fs::create_dir_all(store_dir.as_str())?;
        Ok(LocalImporter { store_dir })
    }
}

impl Importer for LocalImporter {
    type Conn = LocalImportConn;

    fn start_import(&self) -> Result<LocalImportConn, ImportError> {
        Ok(LocalImportConn {
            store_dir: self.store_dir.clone(),
            spool: Vec::new(),
            trailer_received: false,
        })
    }
}

/// One local import: spools the framed stream in memory and
/// materializes the object when the trailer arrives. Dropped without a
/// trailer, nothing ever touches the store.
pub struct LocalImportConn {
    store_dir: StoreDir,
    spool: Vec<u8>,
    trailer_received: bool,
}

impl Write for LocalImportConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spool.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ImportConn for LocalImportConn {
    fn trailer(&mut self, trailer: &ExportTrailer) -> Result<(), ImportError> {
        let rejected = |reason: String| ImportError::Rejected {
            path: trailer.store_path.to_string(),
            reason,
        };

        if self.trailer_received {
            return Err(rejected("duplicate trailer".to_owned()));
        }
        if self.spool.len() < 8 || self.spool[..8] != 1u64.to_le_bytes() {
            return Err(rejected(
                "stream does not start with an object marker".to_owned(),
            ));
        }
        if !self.store_dir.contains(&trailer.store_path) {
            return Err(rejected(format!(
                "path is outside store directory {}",
                self.store_dir
            )));
        }
        for reference in &trailer.references {
            if !self.store_dir.contains(reference) {
                return Err(rejected(format!(
                    "reference {reference} is outside store directory {}",
                    self.store_dir
                )));
            }
        }

        let dest = Path::new(trailer.store_path.as_str());
        if fs::symlink_metadata(dest).is_ok() {
            debug!(path = %trailer.store_path, "store path already exists, keeping it");
        } else {
            self.materialize(trailer, dest)?;
        }
        self.trailer_received = true;
        Ok(())
    }

    fn finish(self) -> Result<(), ImportError> {
        // Finishing without a trailer is the abort path; the spool is
        // simply dropped.
        Ok(())
    }
}

impl LocalImportConn {
    fn materialize(&self, trailer: &ExportTrailer, dest: &Path) -> Result<(), ImportError> {
        let tmp = format!(
            "{}/.import-{}",
            self.store_dir,
            trailer.store_path.digest()
        );
        let tmp = Path::new(&tmp);
        if fs::symlink_metadata(tmp).is_ok() {
            remove_tree(tmp)?;
        }

        let nar = &self.spool[8..];
        if let Err(source) = restore(nar, tmp) {
            let _ = remove_tree(tmp);
            return Err(ImportError::Restore {
                path: trailer.store_path.to_string(),
                source,
            });
        }
        fs::rename(tmp, dest)?;
        debug!(path = %trailer.store_path, "materialized store object");
        Ok(())
    }
}

fn remove_tree(path: &Path) -> io::Result<()> {
    let info = fs::symlink_metadata(path)?;
    if info.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod unittests {
    use quarry_nar::{export, write_single_file};

    use super::*;

    fn importer(dir: &Path) -> LocalImporter {
        let store_dir = StoreDir::new(dir.join("store").to_str().unwrap()).unwrap();
        LocalImporter::new(store_dir).unwrap()
    }

    fn object_path(importer: &LocalImporter, digest_char: char, name: &str) -> ExportTrailer {
        let digest: String = std::iter::repeat(digest_char).take(32).collect();
        ExportTrailer {
            store_path: importer
                .store_dir
                .object(&format!("{digest}-{name}"))
                .unwrap(),
            references: Default::default(),
        }
    }

    #[test]
    fn materializes_on_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let imp = importer(dir.path());
        let trailer = object_path(&imp, 'a', "hi.txt");

        let mut conn = imp.start_import().unwrap();
        export::begin_object(&mut conn).unwrap();
        write_single_file(&mut conn, b"hello\n").unwrap();
        conn.trailer(&trailer).unwrap();
        conn.finish().unwrap();

        assert_eq!(
            fs::read(trailer.store_path.as_str()).unwrap(),
            b"hello\n"
        );
    }

    #[test]
    fn abort_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let imp = importer(dir.path());

        let mut conn = imp.start_import().unwrap();
        export::begin_object(&mut conn).unwrap();
        write_single_file(&mut conn, b"partial").unwrap();
        conn.finish().unwrap(); // no trailer: abort

        let store_root = dir.path().join("store");
        let entries: Vec<_> = fs::read_dir(store_root).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn rejects_foreign_store_paths() {
        let dir = tempfile::tempdir().unwrap();
        let imp = importer(dir.path());
        let foreign = ExportTrailer {
            store_path: "/nix/store/00000000000000000000000000000000-x"
                .parse()
                .unwrap(),
            references: Default::default(),
        };

        let mut conn = imp.start_import().unwrap();
        export::begin_object(&mut conn).unwrap();
        write_single_file(&mut conn, b"x").unwrap();
        let err = conn.trailer(&foreign).unwrap_err();
        assert!(matches!(err, ImportError::Rejected { .. }));
    }

    #[test]
    fn rejects_streams_without_object_marker() {
        let dir = tempfile::tempdir().unwrap();
        let imp = importer(dir.path());
        let trailer = object_path(&imp, 'b', "x");

        let mut conn = imp.start_import().unwrap();
        write_single_file(&mut conn, b"x").unwrap(); // begin_object was skipped
        let err = conn.trailer(&trailer).unwrap_err();
        assert!(matches!(err, ImportError::Rejected { .. }));
    }

    #[test]
    fn existing_objects_are_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let imp = importer(dir.path());
        let trailer = object_path(&imp, 'c', "x");

        for contents in [b"one".as_slice(), b"two"] {
            let mut conn = imp.start_import().unwrap();
            export::begin_object(&mut conn).unwrap();
            write_single_file(&mut conn, contents).unwrap();
            conn.trailer(&trailer).unwrap();
            conn.finish().unwrap();
        }
        // The second import found the path present and left it alone.
        assert_eq!(fs::read(trailer.store_path.as_str()).unwrap(), b"one");
    }
}
