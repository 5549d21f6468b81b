//! Run summary and console report

use crate::crawler::{FailedResource, StageReport};
use crate::output::format_size;
use crate::state::{ProgressSnapshot, Stage};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Everything a finished (or cancelled) run reports
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// One report per stage that ran, in execution order
    pub stages: Vec<StageReport>,

    /// Images skipped because their file name was already claimed
    pub duplicates_skipped: usize,

    /// Bytes written by completed downloads
    pub bytes_written: u64,

    /// Final state of the run's progress counters
    pub progress: ProgressSnapshot,

    pub download_dir: PathBuf,

    /// Total size of the download directory after the run, if readable
    pub dir_size: Option<u64>,

    /// Highest number of simultaneously held budget permits
    pub peak_in_flight: usize,

    /// True if the run was cancelled before all stages finished
    pub cancelled: bool,

    /// SHA-256 of the configuration file, when loaded from disk
    pub config_hash: Option<String>,
}

impl RunSummary {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    /// All terminal failures across stages
    pub fn failures(&self) -> impl Iterator<Item = &FailedResource> {
        self.stages.iter().flat_map(|report| report.failures.iter())
    }

    pub fn total_failures(&self) -> usize {
        self.stages.iter().map(|report| report.failed()).sum()
    }

    /// Number of images written to the download directory
    pub fn files_downloaded(&self) -> usize {
        self.stage(Stage::Downloads)
            .map(|report| report.succeeded)
            .unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Prints the run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Run:");
    println!("  Started: {}", summary.started_at.to_rfc3339());
    println!("  Finished: {}", summary.finished_at.to_rfc3339());
    println!("  Duration: {:.2}s", summary.duration_seconds());
    if summary.cancelled {
        println!("  Status: cancelled");
    } else {
        println!("  Status: completed");
    }
    println!();

    println!("Stages:");
    for report in &summary.stages {
        println!(
            "  {}: {} scheduled, {} succeeded, {} failed ({:.2?})",
            report.stage,
            report.scheduled,
            report.succeeded,
            report.failed(),
            report.elapsed
        );
    }
    println!();

    println!("Downloads:");
    println!("  Files written: {}", summary.files_downloaded());
    println!("  Duplicates skipped: {}", summary.duplicates_skipped);
    println!("  Bytes written: {}", format_size(summary.bytes_written));
    println!("  Peak in-flight requests: {}", summary.peak_in_flight);
    match summary.dir_size {
        Some(size) => println!(
            "  Size of {}: {}",
            summary.download_dir.display(),
            format_size(size)
        ),
        None => println!("  Size of {}: unavailable", summary.download_dir.display()),
    }
    println!();

    let failures = summary.total_failures();
    if failures > 0 {
        println!("Failures ({}):", failures);
        for failure in summary.failures().take(20) {
            println!("  [{}] {}: {}", failure.stage, failure.url, failure.cause);
        }
        if failures > 20 {
            println!("  ... and {} more", failures - 20);
        }
    }
}
