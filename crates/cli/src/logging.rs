//! Subscriber setup: console on stderr, optional main and per-torrent log files.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};
use unnest::Config;

const MAIN_LOG: &str = "unnest.log";
const MAX_NAME_LEN: usize = 100;

/// Console and file verbosity requested on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbosity {
    pub verbose: bool,
    pub quiet: bool,
}

pub fn init(config: &Config, verbosity: Verbosity, torrent_name: Option<&str>) -> Result<()> {
    let level = if verbosity.verbose {
        "debug"
    } else {
        config.log_level.as_filter()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_level = if verbosity.quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::TRACE
    };
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_level);

    let mut main_file = None;
    let mut torrent_file = None;
    if let Some(dir) = &config.log_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create log directory {}", dir.display()))?;

        let file = open_log(&dir.join(MAIN_LOG), config)?;
        main_file = Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));

        if let Some(name) = torrent_name.filter(|_| config.per_torrent_logs) {
            let path = dir.join(format!("{}.log", sanitize_filename(name)));
            let file = open_log(&path, config)?;
            torrent_file = Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(main_file)
        .with(torrent_file)
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}

fn open_log(path: &Path, config: &Config) -> Result<File> {
    rotate(path, config.log_rotation_size, config.log_rotation_count)
        .with_context(|| format!("cannot rotate {}", path.display()))?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))
}

/// Shift `path` to `path.1` (and older backups up by one) once it exceeds `max_bytes`.
pub fn rotate(path: &Path, max_bytes: u64, keep: u32) -> std::io::Result<()> {
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(()),
    };
    if len <= max_bytes {
        return Ok(());
    }
    if keep == 0 {
        return fs::remove_file(path);
    }

    for index in (1..keep).rev() {
        let older = backup_path(path, index);
        if older.exists() {
            fs::rename(&older, backup_path(path, index + 1))?;
        }
    }
    fs::rename(path, backup_path(path, 1))
}

fn backup_path(path: &Path, index: u32) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Make a torrent name usable as a file name.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | ' ' => '_',
            other => other,
        })
        .collect();

    let trimmed: String = replaced.trim_matches('_').chars().take(MAX_NAME_LEN).collect();
    if trimmed.is_empty() {
        "unknown_torrent".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Show: S01/E02"), "My_Show__S01_E02");
        assert_eq!(sanitize_filename("  *release*  "), "release");
        assert_eq!(sanitize_filename("???"), "unknown_torrent");
        assert_eq!(sanitize_filename(""), "unknown_torrent");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), 100);
    }

    #[test]
    fn test_rotate_small_file_untouched() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("unnest.log");
        fs::write(&log, b"short").unwrap();

        rotate(&log, 1024, 3).unwrap();

        assert!(log.exists());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn test_rotate_shifts_backups() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("unnest.log");
        fs::write(&log, b"current log contents").unwrap();
        fs::write(backup_path(&log, 1), b"previous").unwrap();
        fs::write(backup_path(&log, 2), b"oldest").unwrap();

        rotate(&log, 4, 2).unwrap();

        assert!(!log.exists());
        assert_eq!(
            fs::read(backup_path(&log, 1)).unwrap(),
            b"current log contents"
        );
        assert_eq!(fs::read(backup_path(&log, 2)).unwrap(), b"previous");
        assert!(!backup_path(&log, 3).exists());
    }

    #[test]
    fn test_rotate_without_backups_removes() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("unnest.log");
        fs::write(&log, b"too long").unwrap();

        rotate(&log, 1, 0).unwrap();
        assert!(!log.exists());
    }
}
