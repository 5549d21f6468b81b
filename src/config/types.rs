use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Image-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub output: OutputConfig,
}

/// Crawl entry point and global limits
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Listing page the run starts from
    #[serde(rename = "start-page")]
    pub start_page: String,

    /// Base prefix used to resolve relative links
    pub schema: String,

    /// Capacity of the shared concurrency budget (fetches and downloads)
    #[serde(rename = "max-concurrent-requests", default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Overall run timeout in seconds (0 disables it)
    #[serde(rename = "run-timeout-secs", default)]
    pub run_timeout_secs: u64,

    /// Interval between progress log lines in seconds (0 disables them)
    #[serde(rename = "progress-interval-secs", default = "default_progress_interval")]
    pub progress_interval_secs: u64,
}

/// CSS selectors for each stage
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Anchors on the listing page
    #[serde(default = "default_card_selector")]
    pub listing: String,

    /// Anchors on each detail page
    #[serde(default = "default_card_selector")]
    pub detail: String,

    /// Path joined onto the schema to resolve detail-page hrefs
    #[serde(rename = "detail-base", default = "default_detail_base")]
    pub detail_base: String,

    /// Image elements on each sub-page
    #[serde(default = "default_image_selector")]
    pub image: String,

    /// Attribute holding the image URL
    #[serde(rename = "image-attribute", default = "default_image_attribute")]
    pub image_attribute: String,
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Total request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle connections kept per host
    #[serde(rename = "pool-max-idle-per-host", default = "default_max_concurrent")]
    pub pool_max_idle_per_host: usize,
}

/// Retry policy settings
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "backoff-multiplier", default = "default_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub jitter: bool,

    /// HTTP statuses treated as transient
    #[serde(rename = "retry-statuses", default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,

    #[serde(rename = "retry-on-timeout", default = "default_true")]
    pub retry_on_timeout: bool,

    #[serde(rename = "retry-on-connect", default = "default_true")]
    pub retry_on_connect: bool,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory downloaded images are written to
    #[serde(rename = "download-dir")]
    pub download_dir: PathBuf,

    /// Write buffer size for streamed downloads, in bytes
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Optional path of a markdown run summary
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<PathBuf>,
}

impl Config {
    /// Builds a configuration with defaults for everything but the entry points
    pub fn new(
        start_page: impl Into<String>,
        schema: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            crawler: CrawlerConfig {
                start_page: start_page.into(),
                schema: schema.into(),
                max_concurrent_requests: default_max_concurrent(),
                run_timeout_secs: 0,
                progress_interval_secs: default_progress_interval(),
            },
            selectors: SelectorConfig::default(),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            output: OutputConfig {
                download_dir: download_dir.into(),
                chunk_size: default_chunk_size(),
                summary_path: None,
            },
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing: default_card_selector(),
            detail: default_card_selector(),
            detail_base: default_detail_base(),
            image: default_image_selector(),
            image_attribute: default_image_attribute(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            pool_max_idle_per_host: default_max_concurrent(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
            retry_statuses: default_retry_statuses(),
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

fn default_max_concurrent() -> usize {
    100
}

fn default_progress_interval() -> u64 {
    5
}

fn default_card_selector() -> String {
    "div.item_card a".to_string()
}

fn default_detail_base() -> String {
    "depth2/".to_string()
}

fn default_image_selector() -> String {
    "div.img_box img".to_string()
}

fn default_image_attribute() -> String {
    "src".to_string()
}

fn default_user_agent() -> String {
    format!("image-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    6
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

// 400 is a client error and stays out of the default set; add it explicitly if a
// site is known to return it transiently.
fn default_retry_statuses() -> Vec<u16> {
    vec![404, 408, 429, 500, 502, 503, 504]
}

fn default_chunk_size() -> usize {
    512 * 1024
}
