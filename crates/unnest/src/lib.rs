//! # Unnest
//!
//! Recursive extraction of nested archives for post-download pipelines.
//!
//! An [`Extractor`] scans a directory tree for archives, validates each one
//! (integrity, password protection, extraction ratio, nesting depth), extracts
//! it next to itself and rescans, until no new archive appears or the
//! iteration cap of `max_nested_depth + 1` is reached.
//!
//! ## Supported Formats
//!
//! - ZIP
//! - RAR (including multi-volume sets, read-only)
//! - 7-Zip
//! - TAR and TAR.GZ
//!
//! ## Example
//!
//! ```rust,no_run
//! use unnest::{Config, Extractor, ProgressEvent};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     max_extraction_ratio: 50.0,
//!     ..Config::default()
//! };
//!
//! let mut extractor = Extractor::new(config).on_progress(Box::new(|event: &ProgressEvent<'_>| {
//!     if let ProgressEvent::Started { archive } = event {
//!         println!("Extracting {}", archive.display());
//!     }
//!     true // Continue
//! }));
//!
//! let stats = extractor.extract_all(Path::new("downloads"))?;
//! println!(
//!     "{} archives: {} extracted, {} failed, {} skipped",
//!     stats.total_processed, stats.successful, stats.failed, stats.skipped
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod extract;
pub mod probe;
pub mod safety;
pub mod scan;
pub mod stats;
pub mod types;
pub mod validate;

// Re-export main types
pub use config::{Config, ConfigError, ConfigOverrides, ConfigSnapshot, LogLevel};
pub use engine::{Extractor, ProgressEvent};
pub use error::{ErrorCategory, ExtractError, SecurityError};
pub use safety::EntryType;
pub use stats::{
    AggregatedStats, ArchiveRecord, NoopRecorder, RunRecord, StatisticsManager, StatsError,
    StatsRecorder,
};
pub use types::{
    ArchiveEntry, ArchiveFailure, ArchiveListing, ArchiveOutcome, ArchiveType, ExtractOptions,
    ExtractStats, NestedDepthCheck, OverwriteMode, RunStats, SplitPart, ValidationOutcome,
};
pub use validate::ArchiveValidator;

use std::path::Path;

/// Type alias for progress callback functions.
///
/// Called at every [`ProgressEvent`]. Returns `true` to continue, `false` to
/// stop the run before the next archive.
pub type ProgressCallback = dyn Fn(&ProgressEvent<'_>) -> bool + Send + Sync;

/// Probe an archive to retrieve its member listing without extracting.
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist
/// - The format is unsupported or corrupted
pub fn probe(path: &Path) -> Result<ArchiveListing, ExtractError> {
    probe::probe_archive(path)
}

/// Extract a single archive into `output_dir` without any validation.
///
/// Path containment, entry-type filtering and the size cap in `options`
/// still apply.
pub fn extract(
    archive_path: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
) -> Result<ExtractStats, ExtractError> {
    let archive_type = detect::detect_archive_type(archive_path).ok_or_else(|| {
        ExtractError::UnsupportedFormat(archive_path.display().to_string())
    })?;
    extract::extract_archive(archive_path, archive_type, output_dir, options)
}
