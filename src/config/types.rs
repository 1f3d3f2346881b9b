use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Sumi-Archiver
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// URLs the crawl starts from (hop 0)
    pub seeds: Vec<String>,
    pub crawl: CrawlConfig,
    pub warc: WarcConfig,
    #[serde(default)]
    pub spool: SpoolConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Root directory of the job; `warcs/` and `temp/` live below it
    #[serde(rename = "job-path")]
    pub job_path: PathBuf,

    /// Maximum hop distance from a seed; 0 captures only the seeds
    #[serde(rename = "max-hops", default)]
    pub max_hops: u32,

    /// Number of captures running concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Render pages in a headless browser when they need it
    #[serde(default)]
    pub headless: bool,
}

/// Supported compression modes for WARC segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    Gzip,
    None,
}

impl Default for CompressionMode {
    fn default() -> Self {
        CompressionMode::Gzip
    }
}

/// WARC output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WarcConfig {
    /// Filename prefix shared by every segment
    pub prefix: String,

    /// Operator recorded in each segment's warcinfo record
    #[serde(default)]
    pub operator: Option<String>,

    #[serde(default)]
    pub compression: CompressionMode,

    /// Rotate once a segment reaches this many bytes on disk
    #[serde(rename = "max-segment-size", default = "default_max_segment_size")]
    pub max_segment_size: u64,

    /// Rotate once a segment holds this many records (0 disables)
    #[serde(rename = "max-segment-records", default)]
    pub max_segment_records: u64,

    /// Capacity of the queue between capture workers and the writer
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Spool (temporary payload file) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SpoolConfig {
    /// Seconds between orphan sweeps
    #[serde(rename = "sweep-interval-secs", default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Spool files older than this many seconds are considered orphaned
    #[serde(rename = "grace-period-secs", default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            grace_period_secs: default_grace_period(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent string: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

fn default_workers() -> usize {
    8
}

fn default_max_segment_size() -> u64 {
    1_000_000_000
}

fn default_queue_capacity() -> usize {
    256
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_grace_period() -> u64 {
    600
}
