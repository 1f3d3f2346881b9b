//! Configuration module for Sumi-Archiver
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_archiver::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawler will follow up to {} hops", config.crawl.max_hops);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CompressionMode, Config, CrawlConfig, SpoolConfig, UserAgentConfig, WarcConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
