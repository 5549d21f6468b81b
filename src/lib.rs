//! Image-Harvest: a bounded-concurrency crawl-and-download pipeline
//!
//! This crate walks a listing page, expands it through two levels of linked
//! pages, extracts image URLs and downloads every distinct image, with a
//! global limit on in-flight requests, retry on transient failures and
//! de-duplication by file name.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Image-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    /// The listing page could not be fetched or parsed; nothing downstream can run
    #[error("Listing discovery failed for {url}: {source}")]
    Listing {
        url: String,
        #[source]
        source: Box<HarvestError>,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Run cancelled")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("URL has no file name segment: {0}")]
    NoFileName(String),
}

/// Errors produced while fetching a single URL
///
/// Whether an error is worth retrying is decided by
/// [`crawler::RetryPolicy::classify`], not by the variant alone.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// Terminal failure after the retry budget was spent
    #[error("Fetch failed for {url} after {attempts} attempts: {source}")]
    Failed {
        url: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Builds a fetch error from a reqwest transport error
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if error.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else if error.is_builder() {
            Self::InvalidUrl {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Returns the URL this error refers to
    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url }
            | Self::Status { url, .. }
            | Self::Timeout { url }
            | Self::Connect { url, .. }
            | Self::Network { url, .. }
            | Self::Failed { url, .. } => url,
        }
    }
}

/// Errors produced while extracting URLs from a page
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("No parseable markup in document")]
    ParseFailed,
}

/// Errors produced while downloading a single resource
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Cannot derive a file name from {url}")]
    MissingKey { url: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Stream interrupted for {url}: {message}")]
    Network { url: String, message: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download cancelled: {url}")]
    Cancelled { url: String },
}

/// Result type alias for Image-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_harvest, Pipeline};
pub use output::RunSummary;
pub use state::{Resource, ResourceKind};
pub use url::{resource_key, ResourceKey};
