//! Output module for run summaries and reports
//!
//! This module handles:
//! - The [`RunSummary`] returned by a pipeline run
//! - Printing the summary to the console
//! - Writing an optional markdown summary file
//! - Reporting the size of the download directory

mod markdown;
mod size;
mod summary;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use size::{directory_size, format_size};
pub use summary::{print_summary, RunSummary};
