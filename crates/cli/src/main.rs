//! Command-line interface for recursive archive extraction.
//!
//! Meant to be called from a torrent client's "run on completion" hook with
//! the finished download's directory, but works on any directory.

mod logging;
mod output;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use unnest::{Config, ConfigOverrides, Extractor, ProgressEvent, StatisticsManager};

#[derive(Parser)]
#[command(name = "unnest")]
#[command(version, about = "Extract nested archives found in a directory", long_about = None)]
struct Cli {
    /// Directory containing the archives to extract
    directory: PathBuf,

    /// Keep original archives after extraction
    #[arg(long, overrides_with = "no_preserve")]
    preserve: bool,

    /// Delete original archives after successful extraction
    #[arg(long, overrides_with = "preserve")]
    no_preserve: bool,

    /// Debug logging, list archives before and statistics after the run
    #[arg(short, long, overrides_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors on the console, no summary
    #[arg(short, long, overrides_with = "verbose")]
    quiet: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum uncompressed/compressed ratio per archive
    #[arg(long)]
    max_ratio: Option<f64>,

    /// Maximum archive nesting depth
    #[arg(long)]
    max_depth: Option<u32>,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Torrent name used for log context and the per-torrent log file
    #[arg(long)]
    torrent_name: Option<String>,

    /// Statistics file location
    #[arg(long)]
    stats_file: Option<PathBuf>,

    /// Print lifetime statistics after the run
    #[arg(long)]
    show_stats: bool,

    /// Export the statistics file to this path after the run
    #[arg(long, value_name = "FILE")]
    export_stats: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let preserve_originals = if self.no_preserve {
            Some(false)
        } else if self.preserve {
            Some(true)
        } else {
            None
        };

        ConfigOverrides {
            max_extraction_ratio: self.max_ratio,
            max_nested_depth: self.max_depth,
            preserve_originals,
            log_level: None,
            log_dir: self.log_dir.clone(),
            stats_file: self.stats_file.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let (config, ignored) = Config::load_lenient(cli.config.as_deref(), &cli.overrides())?;
    let verbosity = logging::Verbosity {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    logging::init(&config, verbosity, cli.torrent_name.as_deref())?;
    if let (Some(path), Some(e)) = (&cli.config, ignored) {
        warn!(path = %path.display(), error = %e, "Failed to load config file, using defaults");
    }
    debug!(?config, "Configuration loaded");

    let directory = &cli.directory;
    if !directory.exists() {
        bail!("directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("not a directory: {}", directory.display());
    }

    if cli.verbose {
        let archives = unnest::scan::find_archives(directory)?;
        output::print_archive_list(&archives);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    watch_interrupt(Arc::clone(&cancel))?;

    let spinner = (config.progress_indicators && !cli.quiet).then(new_spinner);

    let recorder = StatisticsManager::new(&config);
    let mut extractor = Extractor::with_recorder(config, recorder).cancel_flag(cancel);
    if let Some(name) = &cli.torrent_name {
        extractor = extractor.torrent_name(name.clone());
    }
    if let Some(bar) = &spinner {
        let bar = bar.clone();
        extractor = extractor.on_progress(Box::new(move |event: &ProgressEvent<'_>| {
            if let ProgressEvent::Started { archive } = event {
                let name = archive.file_name().unwrap_or(archive.as_os_str());
                bar.set_message(format!("Extracting {}", name.to_string_lossy()));
            }
            true
        }));
    }

    let result = extractor.extract_all(directory);
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }
    let stats = result?;

    if !cli.quiet {
        output::print_summary(&stats);
    }

    let manager = extractor.into_recorder();
    if cli.verbose || cli.show_stats {
        output::print_aggregated(&manager.aggregated_stats());
    }
    if let Some(dest) = &cli.export_stats {
        let written = manager.export(dest)?;
        println!("Statistics exported to {}", written.display());
    }

    println!("Extraction completed successfully!");
    Ok(())
}

/// Set `cancel` on Ctrl-C; the engine stops before the next archive.
fn watch_interrupt(cancel: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current archive");
        cancel.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")
}

fn new_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
