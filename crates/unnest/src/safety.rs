//! Path containment and zipbomb guards.
//!
//! This module validates archive member paths to prevent zip-slip style
//! traversal, keeps resolved output paths inside the extraction directory,
//! and enforces the zipbomb guards (extraction ratio and written-bytes cap).

use crate::error::{ExtractError, SecurityError};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// What kind of filesystem object an archive member describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryType {
    #[default]
    File,
    Directory,
    Symlink,
    Hardlink,
    /// Devices, fifos, sockets.
    Other,
}

impl EntryType {
    /// Only regular files and directories are ever written to disk.
    pub fn is_extractable(&self) -> bool {
        matches!(self, EntryType::File | EntryType::Directory)
    }
}

/// Refuse members that are not regular files or directories.
pub fn check_entry_type(name: &str, kind: EntryType) -> Result<(), SecurityError> {
    if kind.is_extractable() {
        Ok(())
    } else {
        Err(SecurityError::UnsafeEntryType(format!("{name} ({kind:?})")))
    }
}

/// Turn an archive member name into a relative path that cannot escape the
/// extraction directory.
///
/// `.` components are dropped. Absolute names, `..` components (including
/// backslash-separated ones written by Windows archivers) and names that
/// reduce to nothing are refused.
///
/// ```
/// use std::path::Path;
/// use unnest::safety::validate_entry_path;
///
/// assert_eq!(
///     validate_entry_path(Path::new("./dir/file.txt")).ok().as_deref(),
///     Some(Path::new("dir/file.txt"))
/// );
/// assert!(validate_entry_path(Path::new("dir/../../etc/passwd")).is_err());
/// assert!(validate_entry_path(Path::new("/etc/passwd")).is_err());
/// ```
pub fn validate_entry_path(path: &Path) -> Result<PathBuf, SecurityError> {
    let traversal = || SecurityError::PathTraversal(path.display().to_string());
    let absolute = || SecurityError::AbsolutePath(path.display().to_string());

    if path.has_root() {
        return Err(absolute());
    }

    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => return Err(traversal()),
            Component::RootDir | Component::Prefix(_) => return Err(absolute()),
            Component::Normal(part) => {
                let escapes = part
                    .to_string_lossy()
                    .split('\\')
                    .any(|segment| segment == "..");
                if escapes {
                    return Err(traversal());
                }
                relative.push(part);
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(traversal());
    }
    Ok(relative)
}

/// Resolves where an archive member would land and verifies it stays inside `output_dir`.
///
/// `output_dir` must already be canonical. Parent directories of the member are
/// created, then canonicalized, so a pre-existing symlinked directory cannot
/// redirect the write outside the extraction root.
pub fn contain_entry(output_dir: &Path, entry_name: &str) -> Result<PathBuf, ExtractError> {
    let relative = validate_entry_path(Path::new(entry_name))?;
    let candidate = output_dir.join(&relative);

    let parent = match candidate.parent() {
        Some(parent) => parent,
        None => {
            return Err(SecurityError::PathTraversal(entry_name.to_string()).into());
        }
    };
    fs::create_dir_all(parent).map_err(|e| ExtractError::from_io(e, parent.display()))?;
    let resolved_parent = fs::canonicalize(parent)?;

    if !resolved_parent.starts_with(output_dir) {
        return Err(SecurityError::PathTraversal(format!(
            "{} resolves outside {}",
            entry_name,
            output_dir.display()
        ))
        .into());
    }

    match candidate.file_name() {
        Some(name) => Ok(resolved_parent.join(name)),
        None => Err(SecurityError::PathTraversal(entry_name.to_string()).into()),
    }
}

/// Fails once `written` bytes go past `limit`. `None` disables the cap.
pub fn check_size_limits(written: u64, limit: Option<u64>) -> Result<(), ExtractError> {
    match limit {
        Some(limit) if written > limit => Err(ExtractError::SizeLimitExceeded {
            current: written,
            limit,
        }),
        _ => Ok(()),
    }
}

/// Uncompressed over compressed size; `1.0` when nothing is compressed.
pub fn extraction_ratio(uncompressed: u64, compressed: u64) -> f64 {
    if compressed == 0 {
        1.0
    } else {
        uncompressed as f64 / compressed as f64
    }
}

/// Zipbomb guard: rejects ratios strictly above `limit`.
pub fn check_extraction_ratio(ratio: f64, limit: f64) -> Result<(), ExtractError> {
    if ratio > limit {
        return Err(ExtractError::RatioExceeded { ratio, limit });
    }
    Ok(())
}
