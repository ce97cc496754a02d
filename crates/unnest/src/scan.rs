//! Recursive archive discovery.

use crate::detect::{detect_archive_type, is_incomplete_download};
use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find every supported archive under `root`, sorted by path.
///
/// Files carrying an incomplete-download suffix are ignored. Symlinks are not
/// followed. An error while walking the tree aborts the scan.
pub fn find_archives(root: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut archives = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_incomplete_download(path) || detect_archive_type(path).is_none() {
            continue;
        }
        archives.push(path.to_path_buf());
    }

    archives.sort();
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_archives_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested/deeper")).unwrap();

        for name in [
            "b.zip",
            "a.rar",
            "notes.txt",
            "c.zip.part",
            "d.7z.!qb",
            "nested/e.tar.gz",
            "nested/deeper/f.tgz",
            "nested/g.r00",
        ] {
            fs::write(root.join(name), b"x").unwrap();
        }
        fs::create_dir(root.join("looks-like.zip")).unwrap();

        let found = find_archives(root).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            names,
            vec![
                PathBuf::from("a.rar"),
                PathBuf::from("b.zip"),
                PathBuf::from("nested/deeper/f.tgz"),
                PathBuf::from("nested/e.tar.gz"),
            ]
        );
    }

    #[test]
    fn test_find_archives_is_idempotent() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("one.zip"), b"x").unwrap();
        fs::write(temp.path().join("two.tar"), b"x").unwrap();

        let first = find_archives(temp.path()).unwrap();
        let second = find_archives(temp.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_find_archives_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = find_archives(&temp.path().join("missing"));
        assert!(matches!(result, Err(ExtractError::Scan(_))));
    }
}
