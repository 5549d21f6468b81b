//! One fan-out step of the pipeline
//!
//! [`run_stage`] spawns a task per input item, waits until every task has
//! reached a terminal state and then merges the results. Item failures are
//! recorded in the [`StageReport`] and never stop sibling items.

use crate::state::{DownloadTicket, ProgressCounters, Resource, Stage};
use crate::HarvestError;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Anything a stage can schedule
pub trait StageItem {
    /// URL used to identify the item in reports and logs
    fn url(&self) -> &str;
}

impl StageItem for Resource {
    fn url(&self) -> &str {
        Resource::url(self)
    }
}

impl StageItem for DownloadTicket {
    fn url(&self) -> &str {
        DownloadTicket::url(self)
    }
}

/// A resource that reached a terminal failure, with its last cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResource {
    pub url: String,
    pub stage: Stage,
    pub cause: String,
}

/// What happened in one stage
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,

    /// Items scheduled
    pub scheduled: usize,

    /// Items that finished successfully
    pub succeeded: usize,

    /// Items that failed terminally
    pub failures: Vec<FailedResource>,

    /// When the earliest item task began running
    pub first_item_started: Option<Instant>,

    /// When the latest item task finished
    pub last_item_finished: Option<Instant>,

    /// Wall time of the whole stage
    pub elapsed: Duration,
}

impl StageReport {
    /// A report for a stage with nothing scheduled yet
    pub fn empty(stage: Stage) -> Self {
        Self {
            stage,
            scheduled: 0,
            succeeded: 0,
            failures: Vec::new(),
            first_item_started: None,
            last_item_finished: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.succeeded == self.scheduled
    }

    fn record_timing(&mut self, started: Instant, finished: Instant) {
        self.first_item_started = Some(match self.first_item_started {
            Some(current) => current.min(started),
            None => started,
        });
        self.last_item_finished = Some(match self.last_item_finished {
            Some(current) => current.max(finished),
            None => finished,
        });
    }
}

/// Merged outputs and report of a finished stage
#[derive(Debug)]
pub struct StageOutcome<T> {
    pub outputs: Vec<T>,
    pub report: StageReport,
}

/// Runs `work` for every item concurrently and waits for all of them
///
/// Each item runs in its own tokio task. The task races the work future
/// against `cancel`; a cancelled item is recorded as a failure and its work
/// future is dropped, which releases any budget permit it held. The progress
/// counter of `stage` is advanced once per successful item.
pub async fn run_stage<I, T, F, Fut>(
    stage: Stage,
    items: Vec<I>,
    progress: Arc<ProgressCounters>,
    cancel: CancellationToken,
    work: F,
) -> StageOutcome<T>
where
    I: StageItem,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, HarvestError>> + Send + 'static,
{
    let stage_start = Instant::now();
    let mut report = StageReport::empty(stage);
    report.scheduled = items.len();
    progress.set_total(stage, items.len() as u64);

    tracing::info!("Stage '{}' started with {} items", stage, items.len());

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let url = item.url().to_string();
        let task = work(item);
        let token = cancel.clone();
        let progress = Arc::clone(&progress);

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(HarvestError::Cancelled),
                result = task => result,
            };
            if result.is_ok() {
                progress.record_completed(stage);
            }
            (started, Instant::now(), result)
        });

        handles.push((url, handle));
    }

    let mut outputs = Vec::with_capacity(handles.len());
    for (url, handle) in handles {
        match handle.await {
            Ok((started, finished, result)) => {
                report.record_timing(started, finished);
                match result {
                    Ok(output) => {
                        report.succeeded += 1;
                        outputs.push(output);
                    }
                    Err(error) => {
                        if matches!(error, HarvestError::Cancelled) {
                            tracing::debug!("Cancelled {}", url);
                        } else {
                            tracing::warn!("Stage '{}' item {} failed: {}", stage, url, error);
                        }
                        report.failures.push(FailedResource {
                            url,
                            stage,
                            cause: error.to_string(),
                        });
                    }
                }
            }
            Err(join_error) => {
                tracing::warn!("Stage '{}' task for {} aborted: {}", stage, url, join_error);
                report.failures.push(FailedResource {
                    url,
                    stage,
                    cause: HarvestError::Task(join_error.to_string()).to_string(),
                });
            }
        }
    }

    report.elapsed = stage_start.elapsed();
    tracing::info!(
        "Stage '{}' finished: {} succeeded, {} failed in {:.2?}",
        stage,
        report.succeeded,
        report.failed(),
        report.elapsed
    );

    StageOutcome { outputs, report }
}
