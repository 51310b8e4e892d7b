use std::path::{Component, Path, PathBuf};

use crate::error::EvalError;

/// Where the calling script came from. Relative `path(…)` arguments
/// resolve against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOrigin {
    /// A script loaded from a file; relative paths resolve against its
    /// directory.
    File(PathBuf),
    /// An expression passed on the command line. This origin is
    /// explicitly allow-listed to resolve against the working
    /// directory.
    Expression,
    /// Code with no traceable source, e.g. a chunk compiled from a
    /// string at runtime. Relative imports are refused rather than
    /// silently resolved somewhere surprising.
    Unknown,
}

/// Resolves a `path(…)` argument to a cleaned absolute path.
pub(crate) fn resolve_source_path(
    origin: &ScriptOrigin,
    path: &str,
) -> Result<PathBuf, EvalError> {
    let p = Path::new(path);
    if p.is_absolute() {
        return Ok(clean_path(p));
    }
    let joined = match origin {
        ScriptOrigin::File(source) => {
            let base = source.parent().unwrap_or(Path::new("."));
            base.join(p)
        }
        ScriptOrigin::Expression => p.to_owned(),
        ScriptOrigin::Unknown => return Err(EvalError::NoCallerContext(path.to_owned())),
    };
    if joined.is_absolute() {
        Ok(clean_path(&joined))
    } else {
        let cwd = std::env::current_dir().map_err(|source| EvalError::ResolvePath {
            path: path.to_owned(),
            source,
        })?;
        Ok(clean_path(&cwd.join(joined)))
    }
}

/// Lexical path normalization: drops `.` components and resolves `..`
/// without touching the filesystem.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod unittests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::identity("/a/b", "/a/b")]
    #[case::cur_dir("/a/./b", "/a/b")]
    #[case::parent("/a/c/../b", "/a/b")]
    #[case::parent_at_root("/..", "/")]
    #[case::relative_parents("../../x", "../../x")]
    #[case::trailing_dot("/a/.", "/a")]
    fn clean_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean_path(Path::new(input)), PathBuf::from(expected));
    }

    #[test]
    fn absolute_arguments_ignore_the_origin() {
        let resolved = resolve_source_path(&ScriptOrigin::Unknown, "/srv/data").unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/data"));
    }

    #[test]
    fn file_origin_resolves_against_the_script_directory() {
        let origin = ScriptOrigin::File(PathBuf::from("/proj/build/default.lua"));
        let resolved = resolve_source_path(&origin, "../src").unwrap();
        assert_eq!(resolved, PathBuf::from("/proj/src"));
    }

    #[test]
    fn expression_origin_resolves_against_cwd() {
        let resolved = resolve_source_path(&ScriptOrigin::Expression, "src").unwrap();
        assert_eq!(resolved, clean_path(&std::env::current_dir().unwrap().join("src")));
    }

    #[test]
    fn unknown_origin_refuses_relative_paths() {
        let err = resolve_source_path(&ScriptOrigin::Unknown, "src").unwrap_err();
        assert!(matches!(err, EvalError::NoCallerContext(_)));
    }
}
