use std::fs::{self, Metadata};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use quarry_store_db::{WalkEntry, WalkTable};

use crate::error::EvalError;

pub(crate) const S_IFMT: u32 = 0o170000;
pub(crate) const S_IFDIR: u32 = 0o040000;
pub(crate) const S_IFLNK: u32 = 0o120000;
pub(crate) const S_IFREG: u32 = 0o100000;

pub(crate) fn file_type(mode: u32) -> u32 {
    mode & S_IFMT
}

/// Walks the subtree at `root`, inserting one stamped row per entry
/// into the transient walk relation.
///
/// A symlink at the root is recorded as a leaf, never dereferenced.
/// Directory entries are visited in ascending byte order of their
/// names so the subsequent archive emission is already sorted.
pub(crate) fn walk_path(walk: &WalkTable<'_>, root: &Path) -> Result<(), EvalError> {
    let info = lstat(root)?;
    if file_type(info.mode()) == S_IFLNK {
        return insert_entry(walk, root, &info);
    }
    walk_recursive(walk, root, &info)
}

fn walk_recursive(walk: &WalkTable<'_>, path: &Path, info: &Metadata) -> Result<(), EvalError> {
    insert_entry(walk, path, info)?;
    if file_type(info.mode()) != S_IFDIR {
        return Ok(());
    }
    let mut entries = fs::read_dir(path)
        .and_then(|iter| iter.collect::<std::io::Result<Vec<_>>>())
        .map_err(|source| EvalError::Walk {
            path: path.to_owned(),
            source,
        })?;
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    for entry in entries {
        let child = entry.path();
        let child_info = lstat(&child)?;
        walk_recursive(walk, &child, &child_info)?;
    }
    Ok(())
}

fn insert_entry(walk: &WalkTable<'_>, path: &Path, info: &Metadata) -> Result<(), EvalError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EvalError::NonUtf8Path(path.to_owned()))?;
    let mode = info.mode();
    let (size, link_target, stamp) = match file_type(mode) {
        S_IFLNK => {
            let target = fs::read_link(path).map_err(|source| EvalError::Walk {
                path: path.to_owned(),
                source,
            })?;
            let target = target
                .to_str()
                .ok_or_else(|| EvalError::NonUtf8Path(path.to_owned()))?
                .to_owned();
            let stamp = format!("link:{target}");
            (-1, Some(target), stamp)
        }
        // Directory mtimes churn too much to be useful; stamp presence only.
        S_IFDIR => (-1, None, "dir".to_owned()),
        S_IFREG => (info.len() as i64, None, stamp_metadata(info)),
        _ => (-1, None, stamp_metadata(info)),
    };
    walk.insert(&WalkEntry {
        path: path_str.to_owned(),
        mode,
        size,
        link_target,
        stamp,
    })?;
    Ok(())
}

/// The metadata stamp of a non-directory entry:
/// `<sec>.<usec>-<size>-<inode>-<mode>-<uid>-<gid>`, usec zero-padded
/// to six digits. A cheap change detector, not a content hash.
fn stamp_metadata(info: &Metadata) -> String {
    format!(
        "{}.{:06}-{}-{}-{}-{}-{}",
        info.mtime(),
        info.mtime_nsec() / 1000,
        info.len(),
        info.ino(),
        info.mode(),
        info.uid(),
        info.gid()
    )
}

fn lstat(path: &Path) -> Result<Metadata, EvalError> {
    fs::symlink_metadata(path).map_err(|source| EvalError::Walk {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod unittests {
    use quarry_store_db::CacheDb;

    use super::*;

    #[test]
    fn stamp_shape() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"data").unwrap();
        let info = fs::symlink_metadata(&file).unwrap();
        let stamp = stamp_metadata(&info);

        let (time, rest) = stamp.split_once('-').unwrap();
        let (sec, usec) = time.split_once('.').unwrap();
        assert_eq!(sec, info.mtime().to_string());
        assert_eq!(usec.len(), 6);
        let fields: Vec<String> = rest.split('-').map(str::to_owned).collect();
        assert_eq!(
            fields,
            vec![
                "4".to_string(),
                info.ino().to_string(),
                info.mode().to_string(),
                info.uid().to_string(),
                info.gid().to_string(),
            ]
        );
    }

    #[test]
    fn walk_records_the_whole_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("b.txt"), b"bb").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink("a.txt", root.join("link")).unwrap();

        let db = CacheDb::open_memory().unwrap();
        let walk = WalkTable::create(&db).unwrap();
        walk_path(&walk, &root).unwrap();

        let rows = walk.rows_sorted().unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            names,
            vec![
                root.to_str().unwrap().to_owned(),
                root.join("a.txt").to_str().unwrap().to_owned(),
                root.join("b.txt").to_str().unwrap().to_owned(),
                root.join("link").to_str().unwrap().to_owned(),
            ]
        );
        assert_eq!(rows[0].stamp, "dir");
        assert_eq!(rows[0].size, -1);
        assert_eq!(rows[1].size, 1);
        assert_eq!(rows[3].stamp, "link:a.txt");
        assert_eq!(rows[3].link_target.as_deref(), Some("a.txt"));
    }

    #[test]
    fn symlink_root_is_a_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("inner"), b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let db = CacheDb::open_memory().unwrap();
        let walk = WalkTable::create(&db).unwrap();
        walk_path(&walk, &link).unwrap();

        let rows = walk.rows_sorted().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].size, -1);
        assert!(rows[0].stamp.starts_with("link:"));
    }
}
