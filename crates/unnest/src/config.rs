//! Run configuration: defaults, JSON file, command-line overrides.

use crate::types::{ExtractOptions, OverwriteMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const DEFAULT_SIZE_LIMIT: u64 = 20 * 1024 * 1024 * 1024; // 20 GB
const DEFAULT_ROTATION_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Log verbosity as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Settings consumed by the extraction engine and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Archives whose uncompressed/compressed ratio is above this are rejected
    pub max_extraction_ratio: f64,

    /// Bounds both the loop iterations and the nested-archive scan
    pub max_nested_depth: u32,

    /// Cap on bytes written while extracting one archive
    pub max_total_extracted_bytes: Option<u64>,

    pub overwrite: OverwriteMode,

    /// Keep source archives after a successful extraction
    pub preserve_originals: bool,

    pub log_level: LogLevel,
    pub log_dir: Option<PathBuf>,
    pub per_torrent_logs: bool,
    pub log_rotation_size: u64,
    pub log_rotation_count: u32,

    pub progress_indicators: bool,
    pub stats_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_extraction_ratio: 100.0,
            max_nested_depth: 3,
            max_total_extracted_bytes: Some(DEFAULT_SIZE_LIMIT),
            overwrite: OverwriteMode::Replace,
            preserve_originals: true,
            log_level: LogLevel::Info,
            log_dir: None,
            per_torrent_logs: true,
            log_rotation_size: DEFAULT_ROTATION_SIZE,
            log_rotation_count: 5,
            progress_indicators: true,
            stats_file: None,
        }
    }
}

/// Values given on the command line. `Some` replaces the loaded value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_extraction_ratio: Option<f64>,
    pub max_nested_depth: Option<u32>,
    pub preserve_originals: Option<bool>,
    pub log_level: Option<LogLevel>,
    pub log_dir: Option<PathBuf>,
    pub stats_file: Option<PathBuf>,
}

/// The part of the configuration stored alongside each run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub max_extraction_ratio: f64,
    pub max_nested_depth: u32,
    pub preserve_originals: bool,
    pub log_level: LogLevel,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_extraction_ratio.is_finite() || self.max_extraction_ratio < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "max_extraction_ratio must be at least 1, got {}",
                self.max_extraction_ratio
            )));
        }
        if self.max_nested_depth < 1 {
            return Err(ConfigError::Invalid(
                "max_nested_depth must be at least 1".to_string(),
            ));
        }
        if self.log_rotation_count < 1 {
            return Err(ConfigError::Invalid(
                "log_rotation_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON config file. Unknown keys are ignored; missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = serde_json::from_str(&contents)?;
        config.normalize_paths();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)
    }

    /// Defaults, then `file` when it exists, then `overrides`.
    ///
    /// A config file that cannot be read or parsed is reported and ignored.
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let (config, ignored) = Config::load_lenient(file, overrides)?;
        if let (Some(path), Some(e)) = (file, ignored) {
            warn!(path = %path.display(), error = %e, "Failed to load config file, using defaults");
        }
        Ok(config)
    }

    /// Like [`Config::load`], but hands back the error for an unusable config
    /// file instead of logging it, for callers that set up logging afterwards.
    pub fn load_lenient(
        file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<(Self, Option<ConfigError>), ConfigError> {
        let (mut config, ignored) = match file {
            Some(path) if path.exists() => match Config::from_file(path) {
                Ok(config) => (config, None),
                Err(e) => (Config::default(), Some(e)),
            },
            _ => (Config::default(), None),
        };

        config.apply(overrides);
        config.normalize_paths();
        config.validate()?;
        Ok((config, ignored))
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(ratio) = overrides.max_extraction_ratio {
            self.max_extraction_ratio = ratio;
        }
        if let Some(depth) = overrides.max_nested_depth {
            self.max_nested_depth = depth;
        }
        if let Some(preserve) = overrides.preserve_originals {
            self.preserve_originals = preserve;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(dir) = &overrides.log_dir {
            self.log_dir = Some(dir.clone());
        }
        if let Some(file) = &overrides.stats_file {
            self.stats_file = Some(file.clone());
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            max_extraction_ratio: self.max_extraction_ratio,
            max_nested_depth: self.max_nested_depth,
            preserve_originals: self.preserve_originals,
            log_level: self.log_level,
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            overwrite: self.overwrite,
            size_limit_bytes: self.max_total_extracted_bytes,
        }
    }

    fn normalize_paths(&mut self) {
        self.log_dir = self.log_dir.take().map(|dir| absolutize(&expand_home(&dir)));
        self.stats_file = self.stats_file.take().map(|file| expand_home(&file));
    }
}

/// Replace a leading `~` with the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
