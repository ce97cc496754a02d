//! Pre-extraction validation: existence, type, integrity, password and zipbomb checks.

use crate::config::Config;
use crate::detect::{detect_archive_type, rar_volume_set};
use crate::error::ExtractError;
use crate::probe::{list_entries, verify_integrity};
use crate::safety::{check_extraction_ratio, extraction_ratio, EntryType};
use crate::types::{ArchiveListing, ArchiveType, NestedDepthCheck, ValidationOutcome};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Size and count totals for one archive.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ArchiveMetrics {
    uncompressed: u64,
    compressed: u64,
    ratio: f64,
    file_count: u64,
}

/// Validates archives against the configured safety limits.
#[derive(Debug, Clone)]
pub struct ArchiveValidator {
    max_extraction_ratio: f64,
    max_nested_depth: u32,
}

impl ArchiveValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            max_extraction_ratio: config.max_extraction_ratio,
            max_nested_depth: config.max_nested_depth,
        }
    }

    /// Validate one archive. Never fails: every problem becomes a rejection.
    ///
    /// The ratio check runs on header data only, before any member is
    /// written to disk.
    pub fn validate(&self, path: &Path) -> ValidationOutcome {
        if !path.exists() {
            return ValidationOutcome::rejected(None, &ExtractError::NotFound(path.to_path_buf()));
        }

        let archive_type = match detect_archive_type(path) {
            Some(archive_type) => archive_type,
            None => {
                let err = ExtractError::UnsupportedFormat(
                    path.extension()
                        .map(|e| format!(".{}", e.to_string_lossy()))
                        .unwrap_or_default(),
                );
                return ValidationOutcome::rejected(None, &err);
            }
        };

        match self.measure(path, archive_type) {
            Ok(metrics) => {
                debug!(
                    archive = %path.display(),
                    archive_type = %archive_type,
                    ratio = metrics.ratio,
                    files = metrics.file_count,
                    "Archive accepted"
                );
                ValidationOutcome {
                    accepted: true,
                    archive_type: Some(archive_type),
                    failure_reason: None,
                    failure_category: None,
                    total_uncompressed_bytes: metrics.uncompressed,
                    total_compressed_bytes: metrics.compressed,
                    extraction_ratio: metrics.ratio,
                    file_count: metrics.file_count,
                }
            }
            Err((err, metrics)) => {
                warn!(archive = %path.display(), error = %err, "Archive rejected");
                let mut outcome = ValidationOutcome::rejected(Some(archive_type), &err);
                if let Some(metrics) = metrics {
                    outcome.total_uncompressed_bytes = metrics.uncompressed;
                    outcome.total_compressed_bytes = metrics.compressed;
                    outcome.extraction_ratio = metrics.ratio;
                    outcome.file_count = metrics.file_count;
                }
                outcome
            }
        }
    }

    /// Shallow nested-archive scan.
    ///
    /// Looks only at the direct member names of `path`; nested archives are
    /// not opened. Reports `within_limit = false` once `current_depth + 1`
    /// reaches the configured maximum. A listing failure is logged and treated
    /// as "no nesting found".
    pub fn check_nested_depth(&self, path: &Path, current_depth: u32) -> NestedDepthCheck {
        if current_depth >= self.max_nested_depth {
            return NestedDepthCheck {
                within_limit: false,
                depth_found: current_depth,
            };
        }

        let archive_type = match detect_archive_type(path) {
            Some(archive_type) => archive_type,
            None => {
                return NestedDepthCheck {
                    within_limit: true,
                    depth_found: current_depth,
                }
            }
        };

        let listing = match list_entries(path, archive_type) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(archive = %path.display(), error = %e, "Error checking nested depth");
                return NestedDepthCheck {
                    within_limit: true,
                    depth_found: current_depth,
                };
            }
        };

        let mut depth_found = current_depth;
        for entry in nested_archive_members(&listing) {
            depth_found = depth_found.max(current_depth + 1);
            debug!(archive = %path.display(), member = %entry, "Nested archive found");
            if depth_found >= self.max_nested_depth {
                return NestedDepthCheck {
                    within_limit: false,
                    depth_found,
                };
            }
        }

        NestedDepthCheck {
            within_limit: true,
            depth_found,
        }
    }

    pub fn max_nested_depth(&self) -> u32 {
        self.max_nested_depth
    }

    fn measure(
        &self,
        path: &Path,
        archive_type: ArchiveType,
    ) -> Result<ArchiveMetrics, (ExtractError, Option<ArchiveMetrics>)> {
        let listing = list_entries(path, archive_type).map_err(|e| (e, None))?;
        if listing.encrypted {
            return Err((ExtractError::PasswordProtected, None));
        }

        let on_disk = compressed_on_disk(path, archive_type).map_err(|e| (e, None))?;
        let metrics = compute_metrics(&listing, on_disk);

        // Header sums are enough to refuse a bomb; no need to inflate it first
        check_extraction_ratio(metrics.ratio, self.max_extraction_ratio)
            .map_err(|e| (e, Some(metrics)))?;

        verify_integrity(path, archive_type).map_err(|e| (e, None))?;
        Ok(metrics)
    }
}

/// Bytes the archive occupies on disk. A RAR first volume counts every
/// volume of its set, since the listing reports sizes for the whole set.
fn compressed_on_disk(path: &Path, archive_type: ArchiveType) -> Result<u64, ExtractError> {
    let volumes = match archive_type {
        ArchiveType::Rar => rar_volume_set(path),
        _ => vec![path.to_path_buf()],
    };

    let mut total = 0u64;
    for volume in &volumes {
        total += fs::metadata(volume)
            .map_err(|e| ExtractError::from_io(e, volume.display()))?
            .len();
    }
    if volumes.len() > 1 {
        debug!(archive = %path.display(), volumes = volumes.len(), total, "Measured RAR volume set");
    }
    Ok(total)
}

/// Totals for a listing. The compressed side depends on the format:
/// ZIP sums member sizes; TAR and RAR use the on-disk size (whole volume set for RAR);
/// 7z sums member sizes and falls back to the on-disk size when that is zero.
fn compute_metrics(listing: &ArchiveListing, on_disk: u64) -> ArchiveMetrics {
    let counted: Vec<_> = match listing.format {
        ArchiveType::Tar | ArchiveType::TarGz => listing
            .entries
            .iter()
            .filter(|e| e.kind == EntryType::File)
            .collect(),
        _ => listing.entries.iter().collect(),
    };

    let uncompressed: u64 = counted.iter().map(|e| e.size).sum();
    let member_compressed: u64 = counted.iter().filter_map(|e| e.compressed_size).sum();

    let compressed = match listing.format {
        ArchiveType::Zip => member_compressed,
        ArchiveType::SevenZ if member_compressed > 0 => member_compressed,
        ArchiveType::SevenZ | ArchiveType::Rar | ArchiveType::Tar | ArchiveType::TarGz => on_disk,
    };

    ArchiveMetrics {
        uncompressed,
        compressed,
        ratio: extraction_ratio(uncompressed, compressed),
        file_count: counted.len() as u64,
    }
}

/// Member names that are themselves supported archives.
fn nested_archive_members(listing: &ArchiveListing) -> impl Iterator<Item = &str> {
    let tar_like = matches!(listing.format, ArchiveType::Tar | ArchiveType::TarGz);
    listing
        .entries
        .iter()
        .filter(move |e| {
            if tar_like {
                e.kind == EntryType::File
            } else {
                !e.is_directory()
            }
        })
        .filter(|e| detect_archive_type(Path::new(&e.path)).is_some())
        .map(|e| e.path.as_str())
}
