//! Archive probing: member listings, encryption flags and integrity tests.
//!
//! Every codec error is converted to an [`ExtractError`] here so callers
//! never see `zip`, `unrar`, `sevenz_rust2` or `tar` error types.

use crate::detect::detect_archive_type;
use crate::error::ExtractError;
use crate::safety::EntryType;
use crate::types::{ArchiveEntry, ArchiveListing, ArchiveType};
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Probe an archive to retrieve its member listing without extracting.
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist
/// - The file name has no supported archive extension
/// - The codec cannot parse the archive
pub fn probe_archive(path: &Path) -> Result<ArchiveListing, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }

    let format = detect_archive_type(path).ok_or_else(|| {
        ExtractError::UnsupportedFormat(
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        )
    })?;

    list_entries(path, format)
}

/// List the members of an archive whose type is already known.
pub fn list_entries(path: &Path, format: ArchiveType) -> Result<ArchiveListing, ExtractError> {
    let (entries, encrypted) = match format {
        ArchiveType::Zip => list_zip_entries(path)?,
        ArchiveType::Rar => list_rar_entries(path)?,
        ArchiveType::SevenZ => list_7z_entries(path)?,
        ArchiveType::Tar | ArchiveType::TarGz => list_tar_entries(path, format)?,
    };

    Ok(ArchiveListing {
        format,
        entries,
        encrypted,
    })
}

/// Structural integrity test.
///
/// ZIP members are fully decompressed into a sink so that every CRC is
/// checked. The other formats are validated by their listing pass.
pub fn verify_integrity(path: &Path, format: ArchiveType) -> Result<(), ExtractError> {
    match format {
        ArchiveType::Zip => test_zip_integrity(path),
        ArchiveType::Rar | ArchiveType::SevenZ | ArchiveType::Tar | ArchiveType::TarGz => Ok(()),
    }
}

pub(crate) fn open_zip(path: &Path) -> Result<zip::ZipArchive<BufReader<File>>, ExtractError> {
    let file = File::open(path)?;
    zip::ZipArchive::new(BufReader::new(file)).map_err(map_zip_error)
}

/// List entries in a ZIP archive.
fn list_zip_entries(path: &Path) -> Result<(Vec<ArchiveEntry>, bool), ExtractError> {
    let mut archive = open_zip(path)?;
    let mut entries = Vec::with_capacity(archive.len());
    let mut encrypted = false;

    for i in 0..archive.len() {
        // Raw access reads the header without trying to decrypt
        let entry = archive.by_index_raw(i).map_err(map_zip_error)?;

        if entry.encrypted() {
            encrypted = true;
        }

        entries.push(ArchiveEntry {
            path: entry.name().to_string(),
            kind: if entry.is_dir() {
                EntryType::Directory
            } else {
                EntryType::File
            },
            size: entry.size(),
            compressed_size: Some(entry.compressed_size()),
        });
    }

    Ok((entries, encrypted))
}

fn test_zip_integrity(path: &Path) -> Result<(), ExtractError> {
    let mut archive = open_zip(path)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(map_zip_error)?;
        let name = entry.name().to_string();
        if let Err(e) = io::copy(&mut entry, &mut io::sink()) {
            return Err(ExtractError::Corrupted(format!(
                "Corrupted file in archive: {} ({})",
                name, e
            )));
        }
    }

    Ok(())
}

/// List entries in a TAR archive (optionally gzip-wrapped).
fn list_tar_entries(
    path: &Path,
    format: ArchiveType,
) -> Result<(Vec<ArchiveEntry>, bool), ExtractError> {
    let mut archive = open_tar(path, format)?;
    let mut entries = Vec::new();

    for entry_result in archive.entries().map_err(map_tar_error)? {
        let entry = entry_result.map_err(map_tar_error)?;
        let header = entry.header();

        let path = entry.path().map_err(map_tar_error)?.to_string_lossy().to_string();
        let kind = tar_entry_type(header.entry_type());
        let size = header.size().map_err(map_tar_error)?;

        entries.push(ArchiveEntry {
            path,
            kind,
            size,
            compressed_size: None, // TAR doesn't store per-file compressed sizes
        });
    }

    Ok((entries, false)) // TAR archives are not encrypted
}

pub(crate) fn open_tar(
    path: &Path,
    format: ArchiveType,
) -> Result<tar::Archive<Box<dyn Read>>, ExtractError> {
    use flate2::read::GzDecoder;

    let file = File::open(path)?;
    let reader: Box<dyn Read> = match format {
        ArchiveType::TarGz => Box::new(GzDecoder::new(BufReader::new(file))),
        _ => Box::new(BufReader::new(file)),
    };
    Ok(tar::Archive::new(reader))
}

pub(crate) fn tar_entry_type(entry_type: tar::EntryType) -> EntryType {
    if entry_type.is_file() {
        EntryType::File
    } else if entry_type.is_dir() {
        EntryType::Directory
    } else if entry_type.is_symlink() {
        EntryType::Symlink
    } else if entry_type.is_hard_link() {
        EntryType::Hardlink
    } else {
        EntryType::Other
    }
}

/// List entries in a 7-Zip archive.
fn list_7z_entries(path: &Path) -> Result<(Vec<ArchiveEntry>, bool), ExtractError> {
    use sevenz_rust2::{Password, SevenZMethod, SevenZReader};

    // Encrypted headers fail here with a password error
    let sz = SevenZReader::open(path, Password::empty()).map_err(map_7z_error)?;
    let mut entries = Vec::new();

    // Plain headers can still front AES-encrypted content
    let encrypted = sz.archive().folders.iter().any(|folder| {
        folder
            .coders
            .iter()
            .any(|coder| coder.decompression_method_id() == SevenZMethod::ID_AES256SHA256)
    });

    for entry in sz.archive().files.iter() {
        entries.push(ArchiveEntry {
            path: entry.name().to_string(),
            kind: if entry.is_directory() {
                EntryType::Directory
            } else {
                EntryType::File
            },
            size: entry.size(),
            compressed_size: Some(entry.compressed_size),
        });
    }

    Ok((entries, encrypted))
}

/// List entries in a RAR archive.
pub(crate) fn list_rar_entries(path: &Path) -> Result<(Vec<ArchiveEntry>, bool), ExtractError> {
    use unrar::Archive;

    let archive = Archive::new(path)
        .open_for_listing()
        .map_err(map_rar_error)?;
    let mut entries = Vec::new();
    let mut encrypted = false;
    let mut current = Some(archive);

    while let Some(arch) = current {
        match arch.read_header().map_err(map_rar_error)? {
            Some(header) => {
                let entry_data = header.entry();
                if entry_data.is_encrypted() {
                    encrypted = true;
                }

                entries.push(ArchiveEntry {
                    path: entry_data.filename.to_string_lossy().to_string(),
                    kind: if entry_data.is_directory() {
                        EntryType::Directory
                    } else {
                        EntryType::File
                    },
                    size: entry_data.unpacked_size,
                    compressed_size: None, // packed size is not exposed per entry
                });

                current = Some(header.skip().map_err(map_rar_error)?);
            }
            None => {
                current = None;
            }
        }
    }

    Ok((entries, encrypted))
}

pub(crate) fn map_zip_error(err: zip::result::ZipError) -> ExtractError {
    match err {
        zip::result::ZipError::Io(e) => ExtractError::Io(e),
        other => {
            let msg = other.to_string();
            if is_password_message(&msg) {
                ExtractError::PasswordProtected
            } else {
                ExtractError::Corrupted(format!("Invalid ZIP file: {}", msg))
            }
        }
    }
}

pub(crate) fn map_tar_error(err: io::Error) -> ExtractError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        ExtractError::PermissionDenied(err.to_string())
    } else {
        ExtractError::Corrupted(format!("Invalid TAR file: {}", err))
    }
}

pub(crate) fn map_7z_error(err: impl Display) -> ExtractError {
    let msg = err.to_string();
    if is_password_message(&msg) {
        ExtractError::PasswordProtected
    } else {
        ExtractError::Corrupted(format!("Invalid 7z file: {}", msg))
    }
}

pub(crate) fn map_rar_error(err: impl Display) -> ExtractError {
    let msg = err.to_string();
    if is_password_message(&msg) {
        ExtractError::PasswordProtected
    } else {
        ExtractError::Corrupted(format!("Invalid RAR file: {}", msg))
    }
}

fn is_password_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("password")
        || lower.contains("encrypted")
        || lower.contains("decrypt")
        || lower.contains("aes256")
}
