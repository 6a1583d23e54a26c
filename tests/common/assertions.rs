//! Assertions over the output directory

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Every regular file below `dir`, relative to it, sorted
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

/// Assert that `dir/relative` exists and holds `expected`
pub fn assert_file_content(dir: &Path, relative: &str, expected: &[u8]) {
    let path = dir.join(relative);
    let content = std::fs::read(&path)
        .unwrap_or_else(|e| panic!("expected {} to exist: {e}", path.display()));
    assert_eq!(
        content,
        expected,
        "unexpected content in {}",
        path.display()
    );
}
