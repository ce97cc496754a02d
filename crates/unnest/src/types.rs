//! Type definitions for archive discovery, validation and extraction.

use crate::error::ErrorCategory;
use crate::safety::EntryType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Canonical archive type, derived from the file name only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArchiveType {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "rar")]
    Rar,
    #[serde(rename = "7z")]
    SevenZ,
    #[serde(rename = "tar")]
    Tar,
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl ArchiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveType::Zip => "zip",
            ArchiveType::Rar => "rar",
            ArchiveType::SevenZ => "7z",
            ArchiveType::Tar => "tar",
            ArchiveType::TarGz => "tar.gz",
        }
    }
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual entry within an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path of the entry within the archive
    pub path: String,

    /// What kind of member this is
    #[serde(skip)]
    pub kind: EntryType,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Compressed size in bytes (if the format records one per member)
    pub compressed_size: Option<u64>,
}

impl ArchiveEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryType::Directory
    }
}

/// Member listing of one archive, as reported by its codec.
#[derive(Debug, Clone)]
pub struct ArchiveListing {
    /// Detected archive type
    pub format: ArchiveType,

    /// All members in archive order
    pub entries: Vec<ArchiveEntry>,

    /// Whether any member (or the header) is encrypted
    pub encrypted: bool,
}

/// Result of validating one archive at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub archive_type: Option<ArchiveType>,
    pub failure_reason: Option<String>,
    pub failure_category: Option<ErrorCategory>,
    pub total_uncompressed_bytes: u64,
    pub total_compressed_bytes: u64,
    pub extraction_ratio: f64,
    pub file_count: u64,
}

impl ValidationOutcome {
    pub(crate) fn rejected(
        archive_type: Option<ArchiveType>,
        err: &crate::error::ExtractError,
    ) -> Self {
        Self {
            accepted: false,
            archive_type,
            failure_reason: Some(err.to_string()),
            failure_category: Some(err.category()),
            total_uncompressed_bytes: 0,
            total_compressed_bytes: 0,
            extraction_ratio: 0.0,
            file_count: 0,
        }
    }
}

/// Shallow nested-archive scan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedDepthCheck {
    pub within_limit: bool,
    pub depth_found: u32,
}

/// Multi-volume classification of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPart {
    pub is_split_part: bool,
    pub is_first_part: bool,
}

impl SplitPart {
    /// Non-first volumes must never be extracted on their own.
    pub fn is_continuation(&self) -> bool {
        self.is_split_part && !self.is_first_part
    }
}

/// What happened to a single archive during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    Succeeded,
    Failed {
        reason: String,
        category: ErrorCategory,
    },
    Skipped {
        reason: String,
    },
}

/// A failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome tallies for one invocation of the extraction loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,

    /// Failures in the order they happened
    pub errors: Vec<ArchiveFailure>,

    /// Directory scans performed
    pub iterations: u32,

    /// Whether the run stopped early on request
    pub cancelled: bool,

    /// Wall-clock duration of the run (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl RunStats {
    /// Count one outcome. Keeps `total_processed == successful + failed + skipped`.
    pub fn record(&mut self, path: PathBuf, outcome: &ArchiveOutcome) {
        self.total_processed += 1;
        match outcome {
            ArchiveOutcome::Succeeded => self.successful += 1,
            ArchiveOutcome::Skipped { .. } => self.skipped += 1,
            ArchiveOutcome::Failed { reason, .. } => {
                self.failed += 1;
                self.errors.push(ArchiveFailure {
                    path,
                    message: reason.clone(),
                });
            }
        }
    }
}

/// Options for extracting a single archive.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// How to handle file conflicts during extraction
    pub overwrite: OverwriteMode,

    /// Maximum total extracted size in bytes (default: 20 GB)
    pub size_limit_bytes: Option<u64>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite: OverwriteMode::Replace,
            size_limit_bytes: Some(20 * 1024 * 1024 * 1024), // 20 GB
        }
    }
}

/// How to handle file conflicts during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwriteMode {
    /// Replace existing files
    Replace,

    /// Skip files that already exist
    Skip,

    /// Rename new files by appending (1), (2), etc.
    Rename,
}

/// Statistics about one completed extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of files successfully extracted
    pub files_extracted: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Members dropped by path containment or entry-type checks
    pub entries_rejected: u64,

    /// Duration of the extraction (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
