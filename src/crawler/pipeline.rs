//! Pipeline orchestration
//!
//! The pipeline runs four stages in strict order, each one starting only
//! after every task of the previous one has finished:
//!
//! 1. listing: fetch the start page and extract detail links (fatal on failure)
//! 2. details: fetch every detail page and extract sub-page links
//! 3. images: fetch every sub-page and extract image URLs
//! 4. downloads: claim each image by file name and stream it to disk
//!
//! One [`ConcurrencyBudget`] bounds the in-flight network operations of all
//! stages. A [`CancellationToken`] (fired by the caller or by the optional run
//! timeout) stops the current stage and prevents later ones from starting.

use crate::config::{validate, Config};
use crate::crawler::budget::ConcurrencyBudget;
use crate::crawler::dedup::SeenSet;
use crate::crawler::downloader::Downloader;
use crate::crawler::extractor::{extract, SelectorSpec};
use crate::crawler::fetcher::{build_http_client, Fetcher};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::stage::{run_stage, FailedResource, StageReport};
use crate::output::{directory_size, RunSummary};
use crate::state::{DownloadTicket, Frontier, ProgressCounters, Resource, ResourceKind, Stage};
use crate::url::{resource_key, stage_base};
use crate::{DownloadError, HarvestError, Result};
use chrono::Utc;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A configured harvest
///
/// Holds what every run shares: the validated config, the HTTP client, the
/// retry policy and the compiled selectors. The budget, seen-set and progress
/// counters belong to a single run and are created by [`Pipeline::run`].
pub struct Pipeline {
    config: Config,
    client: Client,
    policy: RetryPolicy,
    cancel: CancellationToken,
    listing_spec: Arc<SelectorSpec>,
    detail_spec: Arc<SelectorSpec>,
    image_spec: Arc<SelectorSpec>,
}

/// State that lives exactly as long as one run
struct RunState {
    budget: ConcurrencyBudget,
    fetcher: Arc<Fetcher>,
    downloader: Arc<Downloader>,
    seen: SeenSet,
    progress: Arc<ProgressCounters>,
    cancel: CancellationToken,
}

impl RunState {
    fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RunState {
    fn drop(&mut self) {
        self.budget.close();
    }
}

impl Pipeline {
    /// Validates `config` and builds the HTTP client and selectors
    pub fn new(config: Config) -> Result<Self> {
        validate(&config)?;

        let client = build_http_client(&config.http)?;
        let policy = RetryPolicy::from_config(&config.retry);

        let schema = &config.crawler.schema;
        let selectors = &config.selectors;
        let listing_spec =
            SelectorSpec::new(&selectors.listing, "href")?.with_base(stage_base(schema, "")?);
        let detail_spec = SelectorSpec::new(&selectors.detail, "href")?
            .with_base(stage_base(schema, &selectors.detail_base)?);
        let image_spec = SelectorSpec::new(&selectors.image, &selectors.image_attribute)?
            .with_base(stage_base(schema, "")?);

        Ok(Self {
            client,
            policy,
            cancel: CancellationToken::new(),
            listing_spec: Arc::new(listing_spec),
            detail_spec: Arc::new(detail_spec),
            image_spec: Arc::new(image_spec),
            config,
        })
    }

    /// Uses an externally owned cancellation token (for Ctrl-C handling)
    ///
    /// Each run watches a child of this token, so cancelling it stops the
    /// current run while a run timeout only ever stops its own run.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Builds the budget, seen-set, progress counters and run token
    fn start_run(&self) -> RunState {
        let budget = ConcurrencyBudget::new(self.config.crawler.max_concurrent_requests);
        let fetcher = Fetcher::new(self.client.clone(), self.policy.clone(), budget.clone());
        let downloader = Downloader::new(fetcher.clone(), self.config.output.chunk_size);

        RunState {
            budget,
            fetcher: Arc::new(fetcher),
            downloader: Arc::new(downloader),
            seen: SeenSet::new(),
            progress: Arc::new(ProgressCounters::new()),
            cancel: self.cancel.child_token(),
        }
    }

    /// Runs all stages and returns the run summary
    ///
    /// Every call starts from an empty seen-set, fresh progress counters and
    /// a new budget; the budget is closed when the call returns.
    ///
    /// # Errors
    ///
    /// - [`HarvestError::Listing`] if the start page cannot be fetched or parsed
    /// - [`HarvestError::Cancelled`] if the run is cancelled during the listing stage
    ///
    /// Failures of individual pages or images, and a download directory that
    /// cannot be created, are recorded in the summary and never fail the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run = self.start_run();

        // Background helpers stop when `run` returns, on every path.
        let finished = CancellationToken::new();
        let _finished_guard = finished.clone().drop_guard();
        self.spawn_run_timeout(&run, finished.clone());
        self.spawn_progress_reporter(&run, finished.clone());

        tracing::info!(
            "Starting harvest from {} (budget {})",
            self.config.crawler.start_page,
            run.budget.capacity()
        );

        let mut reports = Vec::with_capacity(Stage::ALL.len());

        let (detail_pages, listing_report) = self.discover_listing(&run).await?;
        reports.push(listing_report);

        if run.cancelled() {
            return Ok(self.summarize(&run, started_at, reports, 0).await);
        }

        let (sub_pages, report) = self
            .discover_links(
                &run,
                Stage::Details,
                detail_pages,
                &self.detail_spec,
                ResourceKind::Detail,
            )
            .await;
        reports.push(report);

        if run.cancelled() {
            return Ok(self.summarize(&run, started_at, reports, 0).await);
        }

        let (images, report) = self
            .discover_links(
                &run,
                Stage::Images,
                sub_pages,
                &self.image_spec,
                ResourceKind::Image,
            )
            .await;
        reports.push(report);

        if run.cancelled() {
            return Ok(self.summarize(&run, started_at, reports, 0).await);
        }

        let download_dir = self.config.output.download_dir.clone();
        let (tickets, duplicates, unnamed) = claim_downloads(&run.seen, images, &download_dir);

        let mut report = match tokio::fs::create_dir_all(&download_dir).await {
            Ok(()) => self.download_all(&run, tickets).await,
            Err(source) => {
                tracing::error!(
                    "Cannot create download directory {}: {}",
                    download_dir.display(),
                    source
                );
                unwritable_report(tickets, &download_dir, &source)
            }
        };
        report.scheduled += unnamed.len();
        report.failures.extend(unnamed);
        reports.push(report);

        Ok(self.summarize(&run, started_at, reports, duplicates).await)
    }

    /// Fetches the start page; any failure aborts the run
    async fn discover_listing(&self, run: &RunState) -> Result<(Frontier, StageReport)> {
        let listing = Resource::new(
            self.config.crawler.start_page.clone(),
            ResourceKind::Listing,
        );
        let mut report = StageReport::empty(Stage::Listing);
        report.scheduled = 1;
        run.progress.set_total(Stage::Listing, 1);

        tracing::info!("Stage '{}' started with 1 item", Stage::Listing);
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = run.cancel.cancelled() => Err(HarvestError::Cancelled),
            result = fetch_links(&run.fetcher, listing.url(), &self.listing_spec) => result,
        };

        let finished = Instant::now();
        report.first_item_started = Some(started);
        report.last_item_finished = Some(finished);
        report.elapsed = finished - started;

        match result {
            Ok(links) => {
                report.succeeded = 1;
                run.progress.record_completed(Stage::Listing);
                tracing::info!(
                    "Stage '{}' finished: {} detail links in {:.2?}",
                    Stage::Listing,
                    links.len(),
                    report.elapsed
                );
                Ok((Frontier::from_urls(links, ResourceKind::Detail), report))
            }
            Err(HarvestError::Cancelled) => Err(HarvestError::Cancelled),
            Err(source) => {
                tracing::error!("Listing page {} failed: {}", listing.url(), source);
                Err(HarvestError::Listing {
                    url: listing.url().to_string(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Fetches every page of `frontier` and merges the extracted links
    async fn discover_links(
        &self,
        run: &RunState,
        stage: Stage,
        frontier: Frontier,
        spec: &Arc<SelectorSpec>,
        kind: ResourceKind,
    ) -> (Frontier, StageReport) {
        let outcome = run_stage(
            stage,
            frontier.into_resources(),
            Arc::clone(&run.progress),
            run.cancel.clone(),
            |resource: Resource| {
                let fetcher = Arc::clone(&run.fetcher);
                let spec = Arc::clone(spec);
                async move { fetch_links(&fetcher, resource.url(), &spec).await }
            },
        )
        .await;

        let next = Frontier::from_urls(outcome.outputs.into_iter().flatten(), kind);
        tracing::info!("Stage '{}' discovered {} {} URLs", stage, next.len(), kind);
        (next, outcome.report)
    }

    async fn download_all(&self, run: &RunState, tickets: Vec<DownloadTicket>) -> StageReport {
        let outcome = run_stage(
            Stage::Downloads,
            tickets,
            Arc::clone(&run.progress),
            run.cancel.clone(),
            |ticket: DownloadTicket| {
                let downloader = Arc::clone(&run.downloader);
                let progress = Arc::clone(&run.progress);
                let cancel = run.cancel.clone();
                async move {
                    let written = downloader.download(&ticket, &cancel).await?;
                    progress.record_bytes(written);
                    Ok(written)
                }
            },
        )
        .await;

        outcome.report
    }

    async fn summarize(
        &self,
        run: &RunState,
        started_at: chrono::DateTime<Utc>,
        stages: Vec<StageReport>,
        duplicates_skipped: usize,
    ) -> RunSummary {
        let download_dir = self.config.output.download_dir.clone();
        let dir = download_dir.clone();
        let dir_size = match tokio::task::spawn_blocking(move || directory_size(&dir)).await {
            Ok(Ok(size)) => Some(size),
            Ok(Err(e)) => {
                tracing::debug!("Cannot size {}: {}", download_dir.display(), e);
                None
            }
            Err(e) => {
                tracing::debug!("Sizing {} did not finish: {}", download_dir.display(), e);
                None
            }
        };

        let cancelled = run.cancelled();
        if cancelled {
            let last = stages.last().map(|r| r.stage).unwrap_or(Stage::Listing);
            tracing::warn!("Run cancelled during stage '{}'", last);
        }

        RunSummary {
            started_at,
            finished_at: Utc::now(),
            stages,
            duplicates_skipped,
            bytes_written: run.progress.bytes_written(),
            progress: run.progress.snapshot(),
            download_dir,
            dir_size,
            peak_in_flight: run.budget.peak(),
            cancelled,
            config_hash: None,
        }
    }

    fn spawn_run_timeout(&self, run: &RunState, finished: CancellationToken) {
        let secs = self.config.crawler.run_timeout_secs;
        if secs == 0 {
            return;
        }

        let cancel = run.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = finished.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    tracing::warn!("Run timeout of {}s reached, cancelling", secs);
                    cancel.cancel();
                }
            }
        });
    }

    fn spawn_progress_reporter(&self, run: &RunState, finished: CancellationToken) {
        let secs = self.config.crawler.progress_interval_secs;
        if secs == 0 {
            return;
        }

        let progress = Arc::clone(&run.progress);
        let budget = run.budget.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = finished.cancelled() => break,
                    _ = ticker.tick() => {
                        tracing::info!(
                            "Progress: {} | in flight {}/{}",
                            progress.snapshot(),
                            budget.in_flight(),
                            budget.capacity()
                        );
                    }
                }
            }
        });
    }
}

/// Claims each image by its file name
///
/// Returns the tickets to download, the number of duplicates skipped and
/// the images whose URL has no usable file name.
fn claim_downloads(
    seen: &SeenSet,
    images: Frontier,
    dir: &Path,
) -> (Vec<DownloadTicket>, usize, Vec<FailedResource>) {
    let mut tickets = Vec::with_capacity(images.len());
    let mut duplicates = 0;
    let mut unnamed = Vec::new();

    for resource in images.into_resources() {
        let key = match resource_key(resource.url()) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", resource.url(), e);
                let error = DownloadError::MissingKey {
                    url: resource.url().to_string(),
                };
                unnamed.push(FailedResource {
                    url: resource.url().to_string(),
                    stage: Stage::Downloads,
                    cause: HarvestError::from(error).to_string(),
                });
                continue;
            }
        };

        if seen.try_claim(&key) {
            tickets.push(DownloadTicket::new(resource, key, dir));
        } else {
            tracing::debug!("Duplicate image {} ({})", key, resource.url());
            duplicates += 1;
        }
    }

    tracing::info!(
        "{} distinct images to download, {} duplicates skipped",
        tickets.len(),
        duplicates
    );
    (tickets, duplicates, unnamed)
}

/// Download report when the target directory cannot be created
///
/// Every claimed image fails with the directory error; nothing is fetched.
fn unwritable_report(
    tickets: Vec<DownloadTicket>,
    dir: &Path,
    source: &std::io::Error,
) -> StageReport {
    let mut report = StageReport::empty(Stage::Downloads);
    report.scheduled = tickets.len();
    report.failures = tickets
        .iter()
        .map(|ticket| {
            let error = DownloadError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            };
            FailedResource {
                url: ticket.url().to_string(),
                stage: Stage::Downloads,
                cause: HarvestError::from(error).to_string(),
            }
        })
        .collect();
    report
}

/// Fetches one page and extracts the links `spec` selects
async fn fetch_links(fetcher: &Fetcher, url: &str, spec: &SelectorSpec) -> Result<Vec<String>> {
    let body = fetcher.fetch(url).await?;
    let links = extract(&body, spec)?;
    tracing::debug!("{}: {} links", url, links.len());
    Ok(links)
}

/// Builds a pipeline for `config` and runs it to completion
///
/// # Example
///
/// ```no_run
/// use image_harvest::{run_harvest, Config};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo() -> image_harvest::Result<()> {
/// let config = Config::new(
///     "https://parsinger.ru/asyncio/aiofile/3/index.html",
///     "https://parsinger.ru/asyncio/aiofile/3/",
///     "work/download_imgs",
/// );
/// let summary = run_harvest(config, CancellationToken::new()).await?;
/// println!("{} files", summary.files_downloaded());
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: Config, cancel: CancellationToken) -> Result<RunSummary> {
    Pipeline::new(config)?.with_cancellation(cancel).run().await
}
