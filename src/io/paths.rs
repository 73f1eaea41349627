//! Path helpers for references between documents.

use std::path::{Component, Path, PathBuf};

use normalize_path::NormalizePath;

fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    joined.normalize()
}

fn segments(path: &Path) -> Vec<Component<'_>> {
    path.components().collect()
}

/// Path of `to` as seen from the document `from`, with `/` separators.
///
/// Both paths are made absolute and lexically normalised. One `..` is
/// emitted per directory of `from` below the shared prefix. Without any
/// shared prefix `to` is returned unchanged.
pub fn relative_path(from: impl AsRef<Path>, to: impl AsRef<Path>) -> String {
    let (from, to) = (absolute(from.as_ref()), absolute(to.as_ref()));
    let (a, b) = (segments(&from), segments(&to));

    let shared = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    if shared == 0 {
        return to.to_string_lossy().into_owned();
    }

    let ups = a.len().saturating_sub(shared + 1);
    let mut parts: Vec<String> = std::iter::repeat("..".to_owned()).take(ups).collect();
    parts.extend(
        b[shared..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

/// Last segment of a path written with either separator.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Directory holding `file`, or `.` when it has none.
pub fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
