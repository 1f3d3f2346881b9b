//! Sumi-Archiver: a web crawler that keeps what it sees
//!
//! This crate fetches pages (directly over HTTP or through a headless
//! renderer), extracts outlinks for further crawling, and persists every
//! fetched request/response pair as WARC records in rotated, gzip-compressed
//! segment files.

pub mod config;
pub mod crawler;
pub mod spool;
pub mod warc;

use thiserror::Error;

/// Main error type for Sumi-Archiver operations
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to dump request for {url}: {message}")]
    RequestDump { url: String, message: String },

    #[error("Render error for {url}: {message}")]
    Render { url: String, message: String },

    #[error("Failed to initialize WARC writer: {0}")]
    WriterInit(String),

    #[error("WARC writer is no longer accepting records")]
    WriterClosed,

    #[error("WARC writer failed: {0}")]
    Writer(String),

    #[error("WARC writer skipped a batch: {0}")]
    BatchRejected(String),

    #[error("Capture of {url} was cancelled")]
    Cancelled { url: String },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ArchiverError {
    /// Returns true for errors that must stop the whole crawl
    ///
    /// Archival is mandatory: once the writer cannot be started or has
    /// died, crawling on would fetch pages that are never recorded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiverError::WriterInit(_) | ArchiverError::WriterClosed | ArchiverError::Writer(_)
        )
    }
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
}

/// Result type alias for Sumi-Archiver operations
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Capturer, CrawlContext, CrawlSummary, Item, RateCounter};
pub use warc::{Record, RecordBatch, RotatorSettings, WarcWriter, WriterHandle};
