//! File-name based archive classification.
//!
//! Nothing here touches file contents; the only filesystem access is the
//! sibling lookup for legacy `.rar` + `.r00` volume sets.

use crate::types::{ArchiveType, SplitPart};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffixes torrent clients and browsers use for files still being written.
pub const INCOMPLETE_SUFFIXES: &[&str] = &[".part", ".!qb", ".crdownload", ".tmp"];

/// Map a path to its archive type using the (lower-cased) file name.
///
/// Compound extensions (`.tar.gz`, `.tgz`) win over the final extension.
///
/// ```
/// use std::path::Path;
/// use unnest::detect::detect_archive_type;
/// use unnest::ArchiveType;
///
/// assert_eq!(detect_archive_type(Path::new("Movie.TAR.GZ")), Some(ArchiveType::TarGz));
/// assert_eq!(detect_archive_type(Path::new("notes.txt")), None);
/// ```
pub fn detect_archive_type(path: &Path) -> Option<ArchiveType> {
    let name = lowercase_file_name(path)?;

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        return Some(ArchiveType::TarGz);
    }

    let (_, extension) = name.rsplit_once('.')?;
    match extension {
        "zip" => Some(ArchiveType::Zip),
        "rar" => Some(ArchiveType::Rar),
        "7z" => Some(ArchiveType::SevenZ),
        "tar" => Some(ArchiveType::Tar),
        _ => None,
    }
}

/// Classify a path as a (non-)first volume of a multi-volume archive.
///
/// Rules, first match wins:
/// 1. `.r00`, `.r01`, ... are always continuation volumes.
/// 2. `name.partN.rar` is a volume; only `N == 1` is a first part.
/// 3. `name.rar` with a `name.r00` sibling is the first part of a legacy set.
/// 4. Anything else is not split.
pub fn classify_split_part(path: &Path) -> SplitPart {
    let name = match lowercase_file_name(path) {
        Some(name) => name,
        None => return not_split(),
    };
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    if is_legacy_volume_extension(extension) {
        return SplitPart {
            is_split_part: true,
            is_first_part: false,
        };
    }

    if let Some(part) = part_number(&name) {
        return SplitPart {
            is_split_part: true,
            is_first_part: part == 1,
        };
    }

    if extension == "rar" && has_r00_sibling(path) {
        return SplitPart {
            is_split_part: true,
            is_first_part: true,
        };
    }

    not_split()
}

/// All volumes of the RAR set that `first` opens, `first` included, sorted.
///
/// Covers `name.partN.rar` sets and legacy `name.rar` + `name.rNN` sets.
/// Anything that is not a first part yields just `first`.
pub fn rar_volume_set(first: &Path) -> Vec<PathBuf> {
    let alone = || vec![first.to_path_buf()];
    let split = classify_split_part(first);
    if !split.is_split_part || !split.is_first_part {
        return alone();
    }
    let name = match lowercase_file_name(first) {
        Some(name) => name,
        None => return alone(),
    };
    let base = match name.strip_suffix(".rar") {
        Some(stem) => match part_number(&name) {
            Some(_) => stem.rsplit_once(".part").map_or(stem, |(base, _)| base),
            None => stem,
        },
        None => return alone(),
    };
    let dir = match first.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let siblings = match fs::read_dir(dir) {
        Ok(siblings) => siblings,
        Err(_) => return alone(),
    };

    let modern = part_number(&name).is_some();
    let mut volumes: Vec<PathBuf> = siblings
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| {
            let Some(sibling) = lowercase_file_name(path) else {
                return false;
            };
            if modern {
                part_number(&sibling).is_some()
                    && sibling
                        .strip_suffix(".rar")
                        .and_then(|stem| stem.rsplit_once(".part"))
                        .is_some_and(|(b, _)| b == base)
            } else {
                sibling == name
                    || sibling
                        .rsplit_once('.')
                        .is_some_and(|(b, ext)| b == base && is_legacy_volume_extension(ext))
            }
        })
        .collect();

    if volumes.is_empty() {
        return alone();
    }
    volumes.sort();
    volumes
}

/// Whether the file is still being downloaded and must be left alone.
pub fn is_incomplete_download(path: &Path) -> bool {
    match lowercase_file_name(path) {
        Some(name) => INCOMPLETE_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix)),
        None => false,
    }
}

fn not_split() -> SplitPart {
    SplitPart {
        is_split_part: false,
        is_first_part: true,
    }
}

fn lowercase_file_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
}

/// `r` followed by one or more digits.
fn is_legacy_volume_extension(extension: &str) -> bool {
    extension.len() >= 2
        && extension.starts_with('r')
        && extension[1..].chars().all(|c| c.is_ascii_digit())
}

/// Volume number of a `*.partN.rar` name.
fn part_number(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".rar")?;
    let (_, tail) = stem.rsplit_once(".part")?;
    if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}

fn has_r00_sibling(path: &Path) -> bool {
    ["r00", "R00"]
        .iter()
        .any(|ext| path.with_extension(ext).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_detect_single_extensions() {
        assert_eq!(detect_archive_type(Path::new("a.zip")), Some(ArchiveType::Zip));
        assert_eq!(detect_archive_type(Path::new("a.RAR")), Some(ArchiveType::Rar));
        assert_eq!(detect_archive_type(Path::new("a.7z")), Some(ArchiveType::SevenZ));
        assert_eq!(detect_archive_type(Path::new("a.tar")), Some(ArchiveType::Tar));
    }

    #[test]
    fn test_detect_compound_extensions() {
        assert_eq!(
            detect_archive_type(Path::new("dir/a.tar.gz")),
            Some(ArchiveType::TarGz)
        );
        assert_eq!(detect_archive_type(Path::new("a.TGZ")), Some(ArchiveType::TarGz));
    }

    #[test]
    fn test_detect_unsupported() {
        assert_eq!(detect_archive_type(Path::new("a.gz")), None);
        assert_eq!(detect_archive_type(Path::new("a.txt")), None);
        assert_eq!(detect_archive_type(Path::new("zip")), None);
        assert_eq!(detect_archive_type(Path::new("a.zip.part")), None);
        assert_eq!(detect_archive_type(Path::new("a.r00")), None);
    }

    #[test]
    fn test_classify_r_volumes() {
        for name in ["archive.r00", "archive.r01", "ARCHIVE.R15", "x.r123"] {
            let part = classify_split_part(&PathBuf::from(name));
            assert!(part.is_split_part, "{name}");
            assert!(!part.is_first_part, "{name}");
        }
        // `.rar` itself is not a numbered volume
        assert!(!classify_split_part(Path::new("archive.rar")).is_split_part);
    }

    #[test]
    fn test_classify_part_rar() {
        let first = classify_split_part(Path::new("movie.part1.rar"));
        assert!(first.is_split_part && first.is_first_part);

        let padded = classify_split_part(Path::new("movie.part01.rar"));
        assert!(padded.is_split_part && padded.is_first_part);

        let second = classify_split_part(Path::new("movie.part2.rar"));
        assert!(second.is_split_part && !second.is_first_part);
        assert!(second.is_continuation());

        let tenth = classify_split_part(Path::new("Movie.PART10.rar"));
        assert!(tenth.is_continuation());
    }

    #[test]
    fn test_classify_lone_rar() {
        let temp = TempDir::new().unwrap();
        let rar = temp.path().join("archive.rar");
        fs::write(&rar, b"rar").unwrap();

        let part = classify_split_part(&rar);
        assert!(!part.is_split_part);
        assert!(part.is_first_part);
    }

    #[test]
    fn test_classify_legacy_first_part() {
        let temp = TempDir::new().unwrap();
        let rar = temp.path().join("archive.rar");
        fs::write(&rar, b"rar").unwrap();
        fs::write(temp.path().join("archive.r00"), b"vol").unwrap();

        let part = classify_split_part(&rar);
        assert!(part.is_split_part);
        assert!(part.is_first_part);
    }

    #[test]
    fn test_rar_volume_set_part_naming() {
        let temp = TempDir::new().unwrap();
        for name in [
            "Movie.part1.rar",
            "Movie.part2.rar",
            "Movie.part10.rar",
            "Other.part1.rar",
            "Movie.nfo",
        ] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }

        let set = rar_volume_set(&temp.path().join("Movie.part1.rar"));
        let names: Vec<_> = set
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["Movie.part1.rar", "Movie.part10.rar", "Movie.part2.rar"]
        );
    }

    #[test]
    fn test_rar_volume_set_legacy_naming() {
        let temp = TempDir::new().unwrap();
        for name in ["show.rar", "show.r00", "show.r01", "show.sfv", "other.r00"] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }

        let set = rar_volume_set(&temp.path().join("show.rar"));
        assert_eq!(set.len(), 3);
        assert!(set.contains(&temp.path().join("show.r01")));
        assert!(!set.contains(&temp.path().join("other.r00")));
    }

    #[test]
    fn test_rar_volume_set_single_archive() {
        let temp = TempDir::new().unwrap();
        let lone = temp.path().join("lone.rar");
        fs::write(&lone, b"x").unwrap();
        fs::write(temp.path().join("lone.part2.rar"), b"x").unwrap();

        assert_eq!(rar_volume_set(&lone), vec![lone.clone()]);
        let later = temp.path().join("lone.part2.rar");
        assert_eq!(rar_volume_set(&later), vec![later.clone()]);
    }

    #[test]
    fn test_classify_plain_zip() {
        let part = classify_split_part(Path::new("partial.zip"));
        assert!(!part.is_split_part);
        assert!(part.is_first_part);
    }

    #[test]
    fn test_incomplete_downloads() {
        assert!(is_incomplete_download(Path::new("a.zip.part")));
        assert!(is_incomplete_download(Path::new("a.rar.!qB")));
        assert!(is_incomplete_download(Path::new("a.7z.crdownload")));
        assert!(is_incomplete_download(Path::new("a.tmp")));
        assert!(!is_incomplete_download(Path::new("a.zip")));
        assert!(!is_incomplete_download(Path::new("movie.part1.rar")));
    }
}
