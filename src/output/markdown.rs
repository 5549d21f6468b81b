//! Markdown summary generation
//!
//! Writes a human-readable report of a run: timing, per-stage counts,
//! download totals and the failed resources with their last cause.

use crate::output::{format_size, RunSummary};
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Failures listed individually before the rest is collapsed
const MAX_LISTED_FAILURES: usize = 50;

/// Writes the markdown summary of `summary` to `output_path`
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> Result<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Image-Harvest Run Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n",
        summary.duration_seconds()
    ));
    let status = if summary.cancelled {
        "cancelled"
    } else {
        "completed"
    };
    md.push_str(&format!("- **Status**: {}\n", status));
    if let Some(hash) = &summary.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    // Stages
    md.push_str("## Stages\n\n");
    md.push_str("| Stage | Scheduled | Succeeded | Failed | Elapsed |\n");
    md.push_str("|-------|-----------|-----------|--------|---------|\n");
    for report in &summary.stages {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {:.2?} |\n",
            report.stage,
            report.scheduled,
            report.succeeded,
            report.failed(),
            report.elapsed
        ));
    }
    md.push('\n');

    // Downloads
    md.push_str("## Downloads\n\n");
    md.push_str(&format!("- **Files Written**: {}\n", summary.files_downloaded()));
    md.push_str(&format!(
        "- **Duplicates Skipped**: {}\n",
        summary.duplicates_skipped
    ));
    md.push_str(&format!(
        "- **Bytes Written**: {}\n",
        format_size(summary.bytes_written)
    ));
    md.push_str(&format!(
        "- **Peak In-Flight Requests**: {}\n",
        summary.peak_in_flight
    ));
    md.push_str(&format!(
        "- **Download Directory**: {}\n",
        summary.download_dir.display()
    ));
    if let Some(size) = summary.dir_size {
        md.push_str(&format!("- **Directory Size**: {}\n", format_size(size)));
    }
    md.push('\n');

    // Failures
    let failures = summary.total_failures();
    if failures > 0 {
        md.push_str("## Failures\n\n");
        md.push_str("| Stage | URL | Cause |\n");
        md.push_str("|-------|-----|-------|\n");
        for failure in summary.failures().take(MAX_LISTED_FAILURES) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                failure.stage,
                failure.url,
                failure.cause.replace('|', "\\|")
            ));
        }
        if failures > MAX_LISTED_FAILURES {
            md.push_str(&format!(
                "\n... and {} more\n",
                failures - MAX_LISTED_FAILURES
            ));
        }
        md.push('\n');
    }

    md
}
