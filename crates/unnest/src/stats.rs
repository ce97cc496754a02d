//! Outcome recording: the [`StatsRecorder`] hook and a JSON-file backed implementation.

use crate::config::{Config, ConfigSnapshot};
use crate::error::ErrorCategory;
use crate::types::{ArchiveType, RunStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const STATS_FILE_NAME: &str = "extraction_statistics.json";
const STATS_VERSION: &str = "1.0";
const MAX_RECENT_RUNS: usize = 100;

/// Receives per-archive and per-run outcomes from the extraction engine.
///
/// Every method has a no-op default so recorders only implement what they need.
pub trait StatsRecorder {
    fn start_run(&mut self, _root: &Path, _torrent_name: Option<&str>, _config: &Config) {}

    fn record_archive(&mut self, _record: ArchiveRecord) {}

    fn record_skipped(&mut self, _path: &Path, _reason: &str) {}

    fn finish_run(&mut self, _stats: &RunStats) {}
}

/// Recorder that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl StatsRecorder for NoopRecorder {}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to replace statistics file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// One processed (not skipped) archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub path: String,
    #[serde(rename = "type")]
    pub archive_type: Option<ArchiveType>,
    pub size_bytes: u64,
    pub extracted_size_bytes: u64,
    pub compression_ratio: f64,
    pub extraction_time_seconds: f64,
    pub success: bool,
    pub error_type: Option<ErrorCategory>,
    pub error_message: Option<String>,
    pub nested_depth: u32,
    pub timestamp: DateTime<Utc>,
}

impl ArchiveRecord {
    fn type_key(&self) -> String {
        self.archive_type
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// One finished run as stored in `recent_runs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRecord {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub directory: String,
    pub torrent_name: Option<String>,

    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,

    pub archives_by_type: BTreeMap<String, u64>,
    pub errors_by_type: BTreeMap<String, u64>,

    pub total_archive_size_bytes: u64,
    pub total_extracted_size_bytes: u64,
    pub average_compression_ratio: f64,

    pub archives_per_second: f64,
    pub bytes_per_second: f64,

    pub archives: Vec<ArchiveRecord>,
    pub config_snapshot: Option<ConfigSnapshot>,
}

impl RunRecord {
    fn add_archive(&mut self, record: ArchiveRecord) {
        *self.archives_by_type.entry(record.type_key()).or_insert(0) += 1;
        if let Some(category) = record.error_type {
            *self
                .errors_by_type
                .entry(category.as_str().to_string())
                .or_insert(0) += 1;
        }
        self.total_archive_size_bytes += record.size_bytes;
        self.total_extracted_size_bytes += record.extracted_size_bytes;
        self.archives.push(record);
    }

    fn finalize(&mut self, stats: &RunStats, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.duration_seconds = stats.duration.as_secs_f64();

        self.total_processed = stats.total_processed;
        self.successful = stats.successful;
        self.failed = stats.failed;
        self.skipped = stats.skipped;

        if self.duration_seconds > 0.0 {
            self.archives_per_second = self.total_processed as f64 / self.duration_seconds;
            self.bytes_per_second = self.total_archive_size_bytes as f64 / self.duration_seconds;
        }

        let ratios: Vec<f64> = self
            .archives
            .iter()
            .filter(|a| a.success && a.compression_ratio > 0.0)
            .map(|a| a.compression_ratio)
            .collect();
        if !ratios.is_empty() {
            self.average_compression_ratio = ratios.iter().sum::<f64>() / ratios.len() as f64;
        }
    }
}

/// Lifetime totals across every recorded run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatedStats {
    pub total_runs: u64,
    pub first_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,

    pub lifetime_archives_processed: u64,
    pub lifetime_successful: u64,
    pub lifetime_failed: u64,
    pub lifetime_skipped: u64,

    pub lifetime_archive_size_bytes: u64,
    pub lifetime_extracted_size_bytes: u64,

    pub lifetime_archives_by_type: BTreeMap<String, u64>,
    pub lifetime_errors_by_type: BTreeMap<String, u64>,

    pub average_archives_per_run: f64,
    pub most_common_archive_type: Option<String>,
    pub most_common_error_type: Option<String>,
    pub largest_archive_processed_bytes: u64,
    pub fastest_run_seconds: Option<f64>,
}

impl AggregatedStats {
    pub fn fold(&mut self, run: &RunRecord) {
        self.total_runs += 1;
        if self.first_run_time.is_none() {
            self.first_run_time = Some(run.start_time);
        }
        self.last_run_time = Some(run.start_time);

        self.lifetime_archives_processed += run.total_processed;
        self.lifetime_successful += run.successful;
        self.lifetime_failed += run.failed;
        self.lifetime_skipped += run.skipped;
        self.lifetime_archive_size_bytes += run.total_archive_size_bytes;
        self.lifetime_extracted_size_bytes += run.total_extracted_size_bytes;

        for (archive_type, count) in &run.archives_by_type {
            *self
                .lifetime_archives_by_type
                .entry(archive_type.clone())
                .or_insert(0) += count;
        }
        for (error_type, count) in &run.errors_by_type {
            *self
                .lifetime_errors_by_type
                .entry(error_type.clone())
                .or_insert(0) += count;
        }

        self.average_archives_per_run =
            self.lifetime_archives_processed as f64 / self.total_runs as f64;
        self.most_common_archive_type = most_common(&self.lifetime_archives_by_type);
        self.most_common_error_type = most_common(&self.lifetime_errors_by_type);

        if run.duration_seconds > 0.0 {
            self.fastest_run_seconds = Some(match self.fastest_run_seconds {
                Some(fastest) => fastest.min(run.duration_seconds),
                None => run.duration_seconds,
            });
        }

        if let Some(largest) = run.archives.iter().map(|a| a.size_bytes).max() {
            self.largest_archive_processed_bytes =
                self.largest_archive_processed_bytes.max(largest);
        }
    }
}

/// Key with the highest count; ties go to the alphabetically first key.
fn most_common(counts: &BTreeMap<String, u64>) -> Option<String> {
    counts
        .iter()
        .fold(None::<(&String, u64)>, |best, (key, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((key, count)),
        })
        .map(|(key, _)| key.clone())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub exported_at: DateTime<Utc>,
    pub exported_by: String,
    pub stats_file_path: PathBuf,
}

/// On-disk layout of the statistics file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsFile {
    pub version: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub aggregated_stats: AggregatedStats,
    #[serde(default)]
    pub recent_runs: Vec<RunRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_info: Option<ExportInfo>,
}

impl StatsFile {
    fn empty() -> Self {
        Self {
            version: STATS_VERSION.to_string(),
            created: Utc::now(),
            last_updated: None,
            cleared_at: None,
            aggregated_stats: AggregatedStats::default(),
            recent_runs: Vec::new(),
            export_info: None,
        }
    }
}

/// Persists run records and lifetime totals to a JSON file.
#[derive(Debug)]
pub struct StatisticsManager {
    path: PathBuf,
    current: Option<RunRecord>,
}

impl StatisticsManager {
    pub fn new(config: &Config) -> Self {
        Self::with_path(Self::default_path(config))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: None,
        }
    }

    /// `stats_file`, else `<log_dir>/extraction_statistics.json`, else `~/.unnest/...`.
    pub fn default_path(config: &Config) -> PathBuf {
        if let Some(file) = &config.stats_file {
            return file.clone();
        }
        if let Some(dir) = &config.log_dir {
            return dir.join(STATS_FILE_NAME);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".unnest")
            .join(STATS_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The run in progress, if any.
    pub fn current_run(&self) -> Option<&RunRecord> {
        self.current.as_ref()
    }

    pub fn aggregated_stats(&self) -> AggregatedStats {
        self.read().aggregated_stats
    }

    /// Up to `limit` stored runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Vec<RunRecord> {
        let runs = self.read().recent_runs;
        let start = runs.len().saturating_sub(limit);
        runs[start..].iter().rev().cloned().collect()
    }

    /// Write a copy of the statistics file plus export metadata to `dest`.
    pub fn export(&self, dest: &Path) -> Result<PathBuf, StatsError> {
        let mut data = self.read();
        data.export_info = Some(ExportInfo {
            exported_at: Utc::now(),
            exported_by: "unnest".to_string(),
            stats_file_path: self.path.clone(),
        });

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, serde_json::to_string_pretty(&data)?)?;
        info!(path = %dest.display(), "Statistics exported");
        Ok(dest.to_path_buf())
    }

    /// Drop stored runs. With `keep_aggregated` the lifetime totals survive.
    pub fn clear(&self, keep_aggregated: bool) -> Result<(), StatsError> {
        let data = if keep_aggregated {
            let mut data = self.read();
            data.recent_runs.clear();
            data.cleared_at = Some(Utc::now());
            data
        } else {
            StatsFile::empty()
        };

        self.write(&data)?;
        info!(path = %self.path.display(), "Statistics cleared");
        Ok(())
    }

    fn read(&self) -> StatsFile {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StatsFile::empty(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Error reading statistics file");
                return StatsFile::empty();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Statistics file is corrupt, starting fresh");
            StatsFile::empty()
        })
    }

    /// Atomic replace: write a sibling temp file, then rename over the target.
    fn write(&self, data: &StatsFile) -> Result<(), StatsError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, data)?;
        tmp.persist(&self.path)?;
        Ok(())
    }

    fn save_run(&self, run: &RunRecord) -> Result<(), StatsError> {
        let mut data = self.read();
        data.recent_runs.push(run.clone());
        if data.recent_runs.len() > MAX_RECENT_RUNS {
            let excess = data.recent_runs.len() - MAX_RECENT_RUNS;
            data.recent_runs.drain(..excess);
        }
        data.aggregated_stats.fold(run);
        data.last_updated = Some(Utc::now());
        self.write(&data)
    }
}

impl StatsRecorder for StatisticsManager {
    fn start_run(&mut self, root: &Path, torrent_name: Option<&str>, config: &Config) {
        let start_time = Utc::now();
        let run = RunRecord {
            run_id: format!("run_{}", start_time.timestamp_millis()),
            start_time,
            directory: root.display().to_string(),
            torrent_name: torrent_name.map(str::to_string),
            config_snapshot: Some(config.snapshot()),
            ..RunRecord::default()
        };
        info!(run_id = %run.run_id, directory = %run.directory, "Started extraction run");
        self.current = Some(run);
    }

    fn record_archive(&mut self, record: ArchiveRecord) {
        match self.current.as_mut() {
            Some(run) => run.add_archive(record),
            None => warn!("No active extraction run to record archive statistics"),
        }
    }

    fn record_skipped(&mut self, path: &Path, reason: &str) {
        debug!(archive = %path.display(), reason, "Skipped archive");
    }

    fn finish_run(&mut self, stats: &RunStats) {
        let mut run = match self.current.take() {
            Some(run) => run,
            None => {
                warn!("No active extraction run to finish");
                return;
            }
        };

        run.finalize(stats, Utc::now());
        info!(
            run_id = %run.run_id,
            processed = run.total_processed,
            successful = run.successful,
            failed = run.failed,
            duration_seconds = run.duration_seconds,
            "Completed extraction run"
        );

        if let Err(e) = self.save_run(&run) {
            error!(path = %self.path.display(), error = %e, "Failed to save run statistics");
        }
    }
}
