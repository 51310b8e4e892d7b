use std::collections::BTreeSet;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use quarry_nar::{export, write_single_file, EntryKind, Header, NarError, NarWriter};
use quarry_store_core::derivation::Derivation;
use quarry_store_core::{
    fixed_ca_output_path, ContentAddress, References, StoreDir, StorePath,
};
use quarry_store_db::{CacheDb, StoreObjectRow, WalkEntry, WalkTable};
use quarry_utils_hash::{Algorithm, HashingWriter, Sha256};

use crate::context::{ContextString, OUTPUT_CONTEXT_PREFIX};
use crate::error::EvalError;
use crate::import::{ExportTrailer, ImportConn, ImportError, Importer};
use crate::source::{resolve_source_path, ScriptOrigin};
use crate::walk::{self, file_type, S_IFDIR, S_IFLNK, S_IFREG};

/// Argument of the `path` primitive: `path(string | {path, name?})`.
#[derive(Debug, Clone, Copy)]
pub struct PathArg<'a> {
    pub path: &'a str,
    /// Overrides the store object name; defaults to the base filename.
    pub name: Option<&'a str>,
}

impl<'a> From<&'a str> for PathArg<'a> {
    fn from(path: &'a str) -> PathArg<'a> {
        PathArg { path, name: None }
    }
}

/// One evaluation's view of the store: the configured store directory,
/// the persistent import cache, and a handle to the import endpoint.
///
/// Imports are synchronous from the caller's point of view and driven
/// one at a time per evaluation.
pub struct Eval<I: Importer> {
    store_dir: StoreDir,
    cache: CacheDb,
    importer: I,
}

impl<I: Importer> Eval<I> {
    pub fn new(store_dir: StoreDir, cache: CacheDb, importer: I) -> Eval<I> {
        Eval {
            store_dir,
            cache,
            importer,
        }
    }

    pub fn store_dir(&self) -> &StoreDir {
        &self.store_dir
    }

    /// Imports a filesystem subtree into the store.
    ///
    /// Walks and stamps the tree, reuses a cached import when every
    /// stamp matches and the store path still exists, and otherwise
    /// streams the archive to the import endpoint while hashing it in
    /// the same pass. The returned string carries a context entry for
    /// the store path.
    pub fn import_path(
        &mut self,
        origin: &ScriptOrigin,
        arg: PathArg<'_>,
    ) -> Result<ContextString, EvalError> {
        let root = resolve_source_path(origin, arg.path)?;
        let root_str = root
            .to_str()
            .ok_or_else(|| EvalError::NonUtf8Path(root.clone()))?
            .to_owned();
        let name = match arg.name {
            Some(name) => name.to_owned(),
            None => root
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| EvalError::ResolvePath {
                    path: arg.path.to_owned(),
                    source: std::io::Error::other("path has no base name"),
                })?
                .to_owned(),
        };

        let walk_table = WalkTable::create(&self.cache)?;
        walk::walk_path(&walk_table, &root)?;

        // A cache hit is only reusable while the object is still on disk.
        if let Some(prev) = self.cache.find_matching_source(&self.store_dir, &name)? {
            if fs::symlink_metadata(prev.as_str()).is_ok() {
                debug!(path = %prev, "using existing store path");
                return Ok(store_path_string(&prev));
            }
        }

        let rows = walk_table.rows_sorted()?;
        let mut conn = self.importer.start_import()?;
        export::begin_object(&mut conn).map_err(ImportError::from)?;
        let mut nar = NarWriter::new(HashingWriter::new(&mut conn, Algorithm::Sha256));
        for row in &rows {
            emit_entry(&mut nar, &root_str, row)?;
        }
        let hashing = nar.close()?;
        let (_, nar_size, nar_hash) = hashing.finish();

        let ca = ContentAddress::Recursive(nar_hash);
        let store_path =
            fixed_ca_output_path(&self.store_dir, &name, &ca, &References::default())?;
        conn.trailer(&ExportTrailer {
            store_path: store_path.clone(),
            references: BTreeSet::new(),
        })?;
        conn.finish()?;

        self.cache.update_source_cache(&StoreObjectRow {
            path: &store_path,
            nar_size,
            nar_hash: &nar_hash.to_string(),
            ca: &ca.to_string(),
            references: &BTreeSet::new(),
        })?;

        Ok(store_path_string(&store_path))
    }

    /// Imports a string literal as a text store object.
    ///
    /// The contents' string context becomes the object's reference
    /// set; context entries marked as derivation outputs are refused,
    /// since an output has no content to depend on yet.
    pub fn to_file(
        &mut self,
        name: &str,
        contents: &ContextString,
    ) -> Result<ContextString, EvalError> {
        let mut references = BTreeSet::new();
        for dep in contents.context() {
            if dep.starts_with(OUTPUT_CONTEXT_PREFIX) {
                return Err(EvalError::OutputDependency {
                    name: name.to_owned(),
                });
            }
            references.insert(StorePath::parse(dep)?);
        }

        let hash = Sha256::digest(contents.value());
        let refs = References {
            self_reference: false,
            others: references.clone(),
        };
        let store_path =
            fixed_ca_output_path(&self.store_dir, name, &ContentAddress::Text(hash), &refs)?;

        if fs::symlink_metadata(store_path.as_str()).is_ok() {
            debug!(path = %store_path, "using existing store path");
            return Ok(store_path_string(&store_path));
        }

        self.import_single_file(&store_path, contents.value().as_bytes(), references)?;
        Ok(store_path_string(&store_path))
    }

    /// Serializes a derivation, writes it to the store as a
    /// text-addressed object, and returns its `.drv` path.
    pub fn store_derivation(&mut self, drv: &Derivation) -> Result<StorePath, EvalError> {
        if drv.dir != self.store_dir {
            return Err(EvalError::StoreDirMismatch {
                expected: self.store_dir.clone(),
                actual: drv.dir.clone(),
            });
        }
        let (store_path, data) = drv.export()?;

        if fs::symlink_metadata(store_path.as_str()).is_ok() {
            debug!(path = %store_path, "derivation already in store");
            return Ok(store_path);
        }

        self.import_single_file(&store_path, data.as_bytes(), drv.references().others)?;
        Ok(store_path)
    }

    fn import_single_file(
        &mut self,
        store_path: &StorePath,
        contents: &[u8],
        references: BTreeSet<StorePath>,
    ) -> Result<(), EvalError> {
        let mut conn = self.importer.start_import()?;
        export::begin_object(&mut conn).map_err(ImportError::from)?;
        write_single_file(&mut conn, contents)?;
        conn.trailer(&ExportTrailer {
            store_path: store_path.clone(),
            references,
        })?;
        conn.finish()?;
        Ok(())
    }
}

fn emit_entry<W: Write>(
    nar: &mut NarWriter<W>,
    root: &str,
    row: &WalkEntry,
) -> Result<(), EvalError> {
    let subpath = relative_subpath(root, &row.path)?;
    match file_type(row.mode) {
        S_IFDIR => {
            nar.write_header(&Header {
                path: subpath,
                kind: EntryKind::Directory,
            })?;
        }
        S_IFLNK => {
            nar.write_header(&Header {
                path: subpath,
                kind: EntryKind::Symlink {
                    target: row.link_target.clone().unwrap_or_default(),
                },
            })?;
        }
        S_IFREG => {
            nar.write_header(&Header {
                path: subpath,
                kind: EntryKind::Regular {
                    executable: row.mode & 0o111 != 0,
                    size: row.size as u64,
                },
            })?;
            stream_file_contents(nar, Path::new(&row.path), row.size as u64)?;
        }
        _ => {
            return Err(EvalError::UnsupportedFileType {
                path: row.path.clone().into(),
                mode: row.mode,
            });
        }
    }
    Ok(())
}

/// Streams a file into the archive, verifying that its size has not
/// drifted from what the walk recorded.
fn stream_file_contents<W: Write>(
    nar: &mut NarWriter<W>,
    path: &Path,
    recorded: u64,
) -> Result<(), EvalError> {
    let read_err = |source| EvalError::ReadSource {
        path: path.to_owned(),
        source,
    };
    let mut file = fs::File::open(path).map_err(read_err)?;
    let mut buf = [0u8; 64 * 1024];
    let mut copied = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(read_err)?;
        if n == 0 {
            break;
        }
        copied += n as u64;
        if copied > recorded {
            return Err(EvalError::SizeChanged {
                path: path.to_owned(),
                recorded,
                read: copied,
            });
        }
        nar.write_all(&buf[..n]).map_err(NarError::from)?;
    }
    if copied != recorded {
        return Err(EvalError::SizeChanged {
            path: path.to_owned(),
            recorded,
            read: copied,
        });
    }
    Ok(())
}

fn relative_subpath(root: &str, path: &str) -> Result<String, EvalError> {
    if path == root {
        return Ok(String::new());
    }
    path.strip_prefix(&format!("{root}/"))
        .map(str::to_owned)
        .ok_or_else(|| EvalError::Walk {
            path: path.into(),
            source: std::io::Error::other(format!("not below the import root {root}")),
        })
}

fn store_path_string(path: &StorePath) -> ContextString {
    ContextString::new(
        path.as_str().to_owned(),
        BTreeSet::from([path.as_str().to_owned()]),
    )
}
