//! Crawler module for capturing pages into the archive
//!
//! This module contains the core crawling logic, including:
//! - Direct HTTP fetching with streaming bodies
//! - Headless rendering through a pluggable renderer
//! - Spooling large bodies to disk before archival
//! - HTML parsing and outlink extraction
//! - Overall crawl coordination

mod capture;
mod context;
mod coordinator;
mod fetcher;
mod item;
mod parser;
mod rate;
mod render;
mod stream;

pub use capture::{needs_browser, Capturer, Strategy, SPOOL_THRESHOLD};
pub use context::CrawlContext;
pub use coordinator::{run_crawl, CrawlSummary};
pub use fetcher::{build_http_client, ByteStream, FetchedResponse, Fetcher, HttpFetcher, RequestMeta};
pub use item::{url_hash, Item};
pub use parser::extract_outlinks;
pub use rate::RateCounter;
pub use render::{spawn_observer, BrowserEvent, ObservedEvents, Renderer, EVENT_BUFFER};
pub use stream::write_exchange_from_streams;
