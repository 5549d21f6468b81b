//! Crawler module: the network half of the pipeline
//!
//! This module contains:
//! - The shared concurrency budget
//! - HTTP fetching with bounded retry
//! - Link extraction from HTML
//! - The stage runner and the pipeline that sequences the stages
//! - De-duplication and streaming downloads

mod budget;
mod dedup;
mod downloader;
mod extractor;
mod fetcher;
mod pipeline;
mod retry;
mod stage;

pub use budget::{BudgetPermit, ConcurrencyBudget};
pub use dedup::SeenSet;
pub use downloader::{write_stream, Downloader};
pub use extractor::{extract, SelectorSpec};
pub use fetcher::{build_http_client, Fetcher};
pub use pipeline::{run_harvest, Pipeline};
pub use retry::{FailureKind, RetryDecision, RetryPolicy};
pub use stage::{run_stage, FailedResource, StageItem, StageOutcome, StageReport};
