//! Human-readable reports printed to stdout.

use unnest::{AggregatedStats, RunStats};

pub fn print_archive_list(archives: &[std::path::PathBuf]) {
    println!("Found {} archives:", archives.len());
    for archive in archives {
        println!("  {}", archive.display());
    }
}

pub fn print_summary(stats: &RunStats) {
    println!("Extraction summary:");
    println!("  Processed:  {}", stats.total_processed);
    println!("  Successful: {}", stats.successful);
    println!("  Failed:     {}", stats.failed);
    println!("  Skipped:    {}", stats.skipped);
    println!("  Iterations: {}", stats.iterations);
    println!("  Duration:   {:.2}s", stats.duration.as_secs_f64());
    if stats.cancelled {
        println!("  Run was cancelled before all archives were processed");
    }

    if !stats.errors.is_empty() {
        println!("Failed archives:");
        for failure in &stats.errors {
            println!("  {}: {}", failure.path.display(), failure.message);
        }
    }
}

pub fn print_aggregated(stats: &AggregatedStats) {
    println!("=== Aggregated Statistics ===");
    println!("Total runs: {}", stats.total_runs);
    println!(
        "Archives processed: {} ({} successful, {} failed, {} skipped)",
        stats.lifetime_archives_processed,
        stats.lifetime_successful,
        stats.lifetime_failed,
        stats.lifetime_skipped
    );
    println!(
        "Bytes: {} archived, {} extracted",
        stats.lifetime_archive_size_bytes, stats.lifetime_extracted_size_bytes
    );
    println!("Average archives per run: {:.2}", stats.average_archives_per_run);
    if let Some(kind) = &stats.most_common_archive_type {
        println!("Most common archive type: {kind}");
    }
    if let Some(kind) = &stats.most_common_error_type {
        println!("Most common error: {kind}");
    }
    if let Some(fastest) = stats.fastest_run_seconds {
        println!("Fastest run: {fastest:.2}s");
    }
    if let Some(last) = stats.last_run_time {
        println!("Last run: {}", last.to_rfc3339());
    }
}
