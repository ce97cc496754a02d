//! The extraction loop: scan, extract what is new, rescan until nothing new appears.

use crate::config::Config;
use crate::detect::classify_split_part;
use crate::error::{ErrorCategory, ExtractError};
use crate::extract::extract_archive;
use crate::scan::find_archives;
use crate::stats::{ArchiveRecord, NoopRecorder, StatsRecorder};
use crate::types::{ArchiveOutcome, ExtractOptions, RunStats};
use crate::validate::ArchiveValidator;
use crate::ProgressCallback;
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Progress notifications handed to the [`ProgressCallback`].
#[derive(Debug, Clone, Copy)]
pub enum ProgressEvent<'a> {
    /// A directory scan is about to process `found` new archives.
    Iteration { iteration: u32, found: usize },
    /// Processing of `archive` is starting.
    Started { archive: &'a Path },
    /// Processing of `archive` has finished.
    Finished {
        archive: &'a Path,
        outcome: &'a ArchiveOutcome,
    },
}

struct Failure {
    reason: String,
    category: ErrorCategory,
}

impl From<ExtractError> for Failure {
    fn from(err: ExtractError) -> Self {
        Self {
            reason: err.to_string(),
            category: err.category(),
        }
    }
}

/// Recursive extractor for one directory tree.
///
/// ```no_run
/// use unnest::{Config, Extractor};
/// use std::path::Path;
///
/// # fn main() -> Result<(), unnest::ExtractError> {
/// let mut extractor = Extractor::new(Config::default()).torrent_name("Some.Release");
/// let stats = extractor.extract_all(Path::new("/downloads/Some.Release"))?;
/// println!("{} extracted, {} failed", stats.successful, stats.failed);
/// # Ok(())
/// # }
/// ```
pub struct Extractor<R: StatsRecorder = NoopRecorder> {
    config: Config,
    validator: ArchiveValidator,
    options: ExtractOptions,
    recorder: R,
    torrent_name: Option<String>,
    cancel_flag: Arc<AtomicBool>,
    progress: Option<Box<ProgressCallback>>,
    processed: HashSet<PathBuf>,
}

impl Extractor<NoopRecorder> {
    pub fn new(config: Config) -> Self {
        Self::with_recorder(config, NoopRecorder)
    }
}

impl<R: StatsRecorder> Extractor<R> {
    pub fn with_recorder(config: Config, recorder: R) -> Self {
        Self {
            validator: ArchiveValidator::new(&config),
            options: config.extract_options(),
            config,
            recorder,
            torrent_name: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            progress: None,
            processed: HashSet::new(),
        }
    }

    /// Torrent name attached to every log event and run record.
    pub fn torrent_name(mut self, name: impl Into<String>) -> Self {
        self.torrent_name = Some(name.into());
        self
    }

    /// Flag checked before each archive; setting it stops the run.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = flag;
        self
    }

    pub fn on_progress(mut self, callback: Box<ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Archives attempted by the most recent run.
    pub fn processed(&self) -> &HashSet<PathBuf> {
        &self.processed
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn into_recorder(self) -> R {
        self.recorder
    }

    /// Extract archives under `root` until a scan finds nothing new, or
    /// `max_nested_depth + 1` scans have run.
    ///
    /// Per-archive problems are recorded in the returned [`RunStats`]; only a
    /// missing root or a failing directory walk abort the run.
    pub fn extract_all(&mut self, root: &Path) -> Result<RunStats, ExtractError> {
        if !root.exists() {
            return Err(ExtractError::NotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ExtractError::InvalidRoot(root.to_path_buf()));
        }
        let root = fs::canonicalize(root)?;

        let span = info_span!(
            "extraction_run",
            root = %root.display(),
            torrent = self.torrent_name.as_deref().unwrap_or("")
        );
        let _guard = span.enter();

        let start = Instant::now();
        self.processed.clear();
        self.recorder
            .start_run(&root, self.torrent_name.as_deref(), &self.config);

        let mut stats = RunStats::default();
        let result = self.run_iterations(&root, &mut stats);
        stats.duration = start.elapsed();
        self.recorder.finish_run(&stats);

        if let Err(e) = result {
            error!(error = %e, "Extraction run aborted");
            return Err(e);
        }

        info!(
            processed = stats.total_processed,
            successful = stats.successful,
            failed = stats.failed,
            skipped = stats.skipped,
            iterations = stats.iterations,
            cancelled = stats.cancelled,
            "Extraction run complete"
        );
        Ok(stats)
    }

    fn run_iterations(&mut self, root: &Path, stats: &mut RunStats) -> Result<(), ExtractError> {
        let max_iterations = self.config.max_nested_depth.saturating_add(1);

        for iteration in 1..=max_iterations {
            let found = find_archives(root)?;
            stats.iterations = iteration;

            let new_archives: Vec<PathBuf> = found
                .into_iter()
                .filter(|path| !self.processed.contains(path))
                .collect();

            if new_archives.is_empty() {
                debug!(iteration, "No new archives found");
                return Ok(());
            }

            info!(iteration, found = new_archives.len(), "Processing new archives");
            self.notify(&ProgressEvent::Iteration {
                iteration,
                found: new_archives.len(),
            });

            for archive in new_archives {
                if self.is_cancelled() || !self.notify(&ProgressEvent::Started { archive: &archive })
                {
                    self.cancel_flag.store(true, Ordering::Relaxed);
                    stats.cancelled = true;
                    warn!(iteration, "Extraction cancelled");
                    return Ok(());
                }

                let outcome = self.process_one(&archive);
                self.processed.insert(archive.clone());
                stats.record(archive.clone(), &outcome);

                if !self.notify(&ProgressEvent::Finished {
                    archive: &archive,
                    outcome: &outcome,
                }) {
                    self.cancel_flag.store(true, Ordering::Relaxed);
                    stats.cancelled = true;
                    warn!(iteration, "Extraction cancelled");
                    return Ok(());
                }
            }

            if iteration == max_iterations {
                warn!(max_iterations, "Reached maximum iterations, stopping");
            }
        }

        Ok(())
    }

    /// Run one archive through split-part, validation, depth and extraction steps.
    fn process_one(&mut self, archive: &Path) -> ArchiveOutcome {
        if self.processed.contains(archive) {
            return self.skip(archive, "already processed");
        }

        if classify_split_part(archive).is_continuation() {
            info!(archive = %archive.display(), "Skipping split archive part");
            return self.skip(archive, "split archive part");
        }

        info!(archive = %archive.display(), "Processing archive");
        let started = Instant::now();
        let mut record = ArchiveRecord {
            path: archive.display().to_string(),
            archive_type: None,
            size_bytes: fs::metadata(archive).map(|m| m.len()).unwrap_or(0),
            extracted_size_bytes: 0,
            compression_ratio: 0.0,
            extraction_time_seconds: 0.0,
            success: false,
            error_type: None,
            error_message: None,
            nested_depth: 0,
            timestamp: Utc::now(),
        };

        let result = self.attempt(archive, &mut record);
        record.extraction_time_seconds = started.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(()) => {
                record.success = true;
                ArchiveOutcome::Succeeded
            }
            Err(failure) => {
                warn!(archive = %archive.display(), reason = %failure.reason, "Archive failed");
                record.error_type = Some(failure.category);
                record.error_message = Some(failure.reason.clone());
                ArchiveOutcome::Failed {
                    reason: failure.reason,
                    category: failure.category,
                }
            }
        };

        self.recorder.record_archive(record);
        outcome
    }

    fn attempt(&self, archive: &Path, record: &mut ArchiveRecord) -> Result<(), Failure> {
        let validation = self.validator.validate(archive);
        record.archive_type = validation.archive_type;
        record.compression_ratio = validation.extraction_ratio;

        let archive_type = match (validation.accepted, validation.archive_type) {
            (true, Some(archive_type)) => archive_type,
            _ => {
                return Err(Failure {
                    reason: validation
                        .failure_reason
                        .unwrap_or_else(|| "Validation failed".to_string()),
                    category: validation
                        .failure_category
                        .unwrap_or(ErrorCategory::ValidationError),
                })
            }
        };

        let depth = self.validator.check_nested_depth(archive, 0);
        record.nested_depth = depth.depth_found;
        if !depth.within_limit {
            return Err(ExtractError::DepthExceeded {
                depth: depth.depth_found,
                limit: self.validator.max_nested_depth(),
            }
            .into());
        }

        let output_dir = archive
            .parent()
            .ok_or_else(|| ExtractError::NotFound(archive.to_path_buf()))?;

        let extracted = extract_archive(archive, archive_type, output_dir, &self.options)
            .map_err(|e| Failure {
                reason: format!("Extraction failed: {}", e),
                category: e.category(),
            })?;
        record.extracted_size_bytes = extracted.bytes_written;

        info!(
            archive = %archive.display(),
            archive_type = %archive_type,
            files = extracted.files_extracted,
            bytes = extracted.bytes_written,
            "Successfully extracted"
        );

        if !self.config.preserve_originals {
            fs::remove_file(archive)
                .map_err(|e| ExtractError::from_io(e, archive.display()))?;
            info!(archive = %archive.display(), "Deleted original archive");
        }

        Ok(())
    }

    fn skip(&mut self, archive: &Path, reason: &str) -> ArchiveOutcome {
        self.recorder.record_skipped(archive, reason);
        ArchiveOutcome::Skipped {
            reason: reason.to_string(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// Returns `false` when the callback asks to stop.
    fn notify(&self, event: &ProgressEvent<'_>) -> bool {
        match &self.progress {
            Some(callback) => callback(event),
            None => true,
        }
    }
}
