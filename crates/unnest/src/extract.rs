//! Archive extraction with path containment and size guards.

use crate::error::{ExtractError, SecurityError};
use crate::probe::{
    list_rar_entries, map_7z_error, map_rar_error, map_tar_error, map_zip_error, open_tar,
    open_zip, tar_entry_type,
};
use crate::safety::{check_entry_type, check_size_limits, contain_entry, EntryType};
use crate::types::{ArchiveType, ExtractOptions, ExtractStats, OverwriteMode};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Extract every member of an archive into `output_dir`.
///
/// Members whose resolved path would leave `output_dir` are skipped with a
/// warning, as are symlinks, hard links and special files. The archive only
/// fails on that account when every non-directory member was rejected.
///
/// # Arguments
///
/// * `archive_path` - Path to the archive file
/// * `archive_type` - Detected archive type
/// * `output_dir` - Directory where files will be extracted
/// * `options` - Overwrite mode and written-bytes cap
pub fn extract_archive(
    archive_path: &Path,
    archive_type: ArchiveType,
    output_dir: &Path,
    options: &ExtractOptions,
) -> Result<ExtractStats, ExtractError> {
    let start_time = Instant::now();

    if !archive_path.exists() {
        return Err(ExtractError::NotFound(archive_path.to_path_buf()));
    }

    fs::create_dir_all(output_dir).map_err(|e| ExtractError::from_io(e, output_dir.display()))?;
    let root = fs::canonicalize(output_dir)?;

    let mut session = Session::new(root, options);
    match archive_type {
        ArchiveType::Zip => extract_zip(archive_path, &mut session)?,
        ArchiveType::Rar => extract_rar(archive_path, &mut session)?,
        ArchiveType::SevenZ => extract_7z(archive_path, &mut session)?,
        ArchiveType::Tar | ArchiveType::TarGz => {
            extract_tar(archive_path, archive_type, &mut session)?
        }
    }

    session.finish(archive_path, start_time)
}

/// Per-archive bookkeeping shared by every format.
struct Session<'a> {
    root: PathBuf,
    options: &'a ExtractOptions,
    stats: ExtractStats,
    files_seen: u64,
    files_rejected: u64,
}

impl<'a> Session<'a> {
    fn new(root: PathBuf, options: &'a ExtractOptions) -> Self {
        Self {
            root,
            options,
            stats: ExtractStats::default(),
            files_seen: 0,
            files_rejected: 0,
        }
    }

    /// Decide where a member goes. `None` means "do not write it".
    ///
    /// Directories are created here and always return `None`.
    fn admit(&mut self, name: &str, kind: EntryType) -> Result<Option<PathBuf>, ExtractError> {
        if kind != EntryType::Directory {
            self.files_seen += 1;
        }

        if let Err(e) = check_entry_type(name, kind) {
            warn!(member = name, error = %e, "Skipping member: unsafe entry type");
            self.reject(kind);
            return Ok(None);
        }

        let target = match contain_entry(&self.root, name) {
            Ok(target) => target,
            Err(ExtractError::Security(e)) => {
                warn!(member = name, error = %e, "Skipping member: path traversal");
                self.reject(kind);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if kind == EntryType::Directory {
            fs::create_dir_all(&target).map_err(|e| ExtractError::from_io(e, target.display()))?;
            return Ok(None);
        }

        if self.options.overwrite == OverwriteMode::Skip && target.exists() {
            debug!(member = name, "Skipping existing file");
            return Ok(None);
        }

        handle_overwrite_mode(&target, self.options.overwrite).map(Some)
    }

    fn reject(&mut self, kind: EntryType) {
        self.stats.entries_rejected += 1;
        if kind != EntryType::Directory {
            self.files_rejected += 1;
        }
    }

    /// Stream a member to disk, stopping as soon as the size cap is crossed.
    fn write_member(&mut self, reader: &mut dyn Read, target: &Path) -> Result<(), ExtractError> {
        let mut file =
            File::create(target).map_err(|e| ExtractError::from_io(e, target.display()))?;

        let written = match self.options.size_limit_bytes {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.stats.bytes_written);
                let mut limited = (&mut *reader).take(remaining.saturating_add(1));
                io::copy(&mut limited, &mut file)
            }
            None => io::copy(reader, &mut file),
        }
        .map_err(|e| ExtractError::from_io(e, target.display()))?;

        self.account(written)
    }

    /// Refuse a member up front when its declared size already crosses the cap.
    fn reserve(&self, declared: u64) -> Result<(), ExtractError> {
        check_size_limits(
            self.stats.bytes_written.saturating_add(declared),
            self.options.size_limit_bytes,
        )
    }

    fn account(&mut self, written: u64) -> Result<(), ExtractError> {
        self.stats.bytes_written += written;
        self.stats.files_extracted += 1;
        check_size_limits(self.stats.bytes_written, self.options.size_limit_bytes)
    }

    fn finish(mut self, archive_path: &Path, start_time: Instant) -> Result<ExtractStats, ExtractError> {
        if self.files_seen > 0 && self.files_rejected == self.files_seen {
            return Err(SecurityError::PathTraversal(format!(
                "all {} members of {} were rejected",
                self.files_seen,
                archive_path.display()
            ))
            .into());
        }

        self.stats.duration = start_time.elapsed();
        debug!(
            archive = %archive_path.display(),
            files = self.stats.files_extracted,
            bytes = self.stats.bytes_written,
            rejected = self.stats.entries_rejected,
            "Extraction finished"
        );
        Ok(self.stats)
    }
}

fn extract_zip(archive_path: &Path, session: &mut Session<'_>) -> Result<(), ExtractError> {
    let mut archive = open_zip(archive_path)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(map_zip_error)?;
        let name = entry.name().to_string();
        let kind = zip_entry_type(entry.is_dir(), entry.unix_mode());

        if let Some(target) = session.admit(&name, kind)? {
            session.write_member(&mut entry, &target)?;
        }
    }

    Ok(())
}

fn zip_entry_type(is_dir: bool, unix_mode: Option<u32>) -> EntryType {
    const S_IFMT: u32 = 0o170_000;
    const S_IFLNK: u32 = 0o120_000;

    if is_dir {
        EntryType::Directory
    } else if unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
        EntryType::Symlink
    } else {
        EntryType::File
    }
}

fn extract_tar(
    archive_path: &Path,
    archive_type: ArchiveType,
    session: &mut Session<'_>,
) -> Result<(), ExtractError> {
    let mut archive = open_tar(archive_path, archive_type)?;

    for entry in archive.entries().map_err(map_tar_error)? {
        let mut entry = entry.map_err(map_tar_error)?;
        let name = entry
            .path()
            .map_err(map_tar_error)?
            .to_string_lossy()
            .to_string();
        let kind = tar_entry_type(entry.header().entry_type());

        if let Some(target) = session.admit(&name, kind)? {
            session.write_member(&mut entry, &target)?;
        }
    }

    Ok(())
}

/// RAR archives are extracted through unrar, which follows the volume chain
/// when `archive_path` is the first part of a set.
fn extract_rar(archive_path: &Path, session: &mut Session<'_>) -> Result<(), ExtractError> {
    use unrar::Archive;

    // Validation may have happened several archives ago
    let (_, encrypted) = list_rar_entries(archive_path)?;
    if encrypted {
        warn!(archive = %archive_path.display(), "RAR archive is password protected");
        return Err(ExtractError::PasswordProtected);
    }

    let open_archive = Archive::new(archive_path)
        .open_for_processing()
        .map_err(map_rar_error)?;
    let mut current = Some(open_archive);

    while let Some(arch) = current {
        match arch.read_header().map_err(map_rar_error)? {
            Some(header) => {
                let entry = header.entry();
                let name = entry.filename.to_string_lossy().to_string();
                let kind = if entry.is_directory() {
                    EntryType::Directory
                } else {
                    EntryType::File
                };
                let unpacked_size = entry.unpacked_size;

                current = Some(match session.admit(&name, kind)? {
                    Some(target) => {
                        session.reserve(unpacked_size)?;
                        let next = header.extract_to(&target).map_err(map_rar_error)?;
                        session.account(unpacked_size)?;
                        next
                    }
                    None => header.skip().map_err(map_rar_error)?,
                });
            }
            None => current = None,
        }
    }

    Ok(())
}

fn extract_7z(archive_path: &Path, session: &mut Session<'_>) -> Result<(), ExtractError> {
    use sevenz_rust2::{Password, SevenZReader};

    // Encrypted headers are refused at open time
    SevenZReader::open(archive_path, Password::empty()).map_err(map_7z_error)?;

    let mut failure: Option<ExtractError> = None;
    let root = session.root.clone();

    let result = sevenz_rust2::decompress_file_with_extract_fn(
        archive_path,
        &root,
        |entry: &sevenz_rust2::SevenZArchiveEntry, reader: &mut dyn Read, _dest: &PathBuf| {
            let kind = if entry.is_directory() {
                EntryType::Directory
            } else {
                EntryType::File
            };

            let outcome = match session.admit(entry.name(), kind) {
                Ok(Some(target)) => session.write_member(reader, &target),
                // Solid blocks share one stream; skipped members must still be consumed
                Ok(None) => io::copy(reader, &mut io::sink())
                    .map(|_| ())
                    .map_err(ExtractError::from),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => Ok(true),
                Err(e) => {
                    let msg = e.to_string();
                    failure = Some(e);
                    Err(sevenz_rust2::Error::Other(msg.into()))
                }
            }
        },
    );

    if let Some(err) = failure {
        return Err(err);
    }
    result.map_err(map_7z_error)
}

/// Handle file overwrite based on the configured mode.
fn handle_overwrite_mode(path: &Path, mode: OverwriteMode) -> Result<PathBuf, ExtractError> {
    match mode {
        OverwriteMode::Replace | OverwriteMode::Skip => Ok(path.to_path_buf()),
        OverwriteMode::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let parent = path.parent().unwrap_or(Path::new(""));
            let file_stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
            let extension = path.extension().and_then(|s| s.to_str());

            for i in 1..1000 {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", file_stem, i, ext),
                    None => format!("{} ({})", file_stem, i),
                };

                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(ExtractError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "Could not find unique filename",
            )))
        }
    }
}
