//! Reading configuration files
//!
//! A configuration is parsed from TOML and validated before anything else
//! uses it. The SHA-256 of the raw file is logged at startup so a crawl's
//! output can be traced back to the exact settings that produced it.

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration text
///
/// # Example
///
/// ```
/// use sumi_archiver::config::parse_config;
///
/// let config = parse_config(r#"
/// seeds = ["https://example.com/"]
///
/// [crawl]
/// job-path = "jobs/example"
///
/// [warc]
/// prefix = "EXAMPLE"
///
/// [user-agent]
/// crawler-name = "SumiArchiver"
/// crawler-version = "0.1"
/// contact-url = "https://example.com/about"
/// contact-email = "ops@example.com"
/// "#).unwrap();
/// assert_eq!(config.crawl.max_hops, 0);
/// ```
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Loads, parses and validates the configuration file at `path`
///
/// ```no_run
/// use std::path::Path;
/// use sumi_archiver::config::load_config;
///
/// let config = load_config(Path::new("archiver.toml")).unwrap();
/// println!("Writing to {}", config.crawl.job_path.display());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Hex SHA-256 of the configuration file as stored on disk
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_content(&std::fs::read(path)?))
}

/// Loads the configuration and hashes the very bytes it was parsed from
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(content.as_bytes())))
}

fn hash_content(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
