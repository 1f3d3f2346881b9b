use crate::config::types::{Config, CrawlConfig, SpoolConfig, UserAgentConfig, WarcConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on concurrent capture workers
const MAX_WORKERS: usize = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seeds(&config.seeds)?;
    validate_crawl_config(&config.crawl)?;
    validate_warc_config(&config.warc)?;
    validate_spool_config(&config.spool)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates seed URLs: at least one, all absolute http(s)
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates crawl configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.job_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "job_path cannot be empty".to_string(),
        ));
    }

    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    Ok(())
}

/// Validates WARC output configuration
fn validate_warc_config(config: &WarcConfig) -> Result<(), ConfigError> {
    if config.prefix.is_empty() {
        return Err(ConfigError::Validation("prefix cannot be empty".to_string()));
    }

    // The prefix becomes part of a file name
    if config
        .prefix
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(ConfigError::Validation(format!(
            "prefix must not contain path separators, got '{}'",
            config.prefix
        )));
    }

    if config.max_segment_size == 0 {
        return Err(ConfigError::Validation(
            "max_segment_size must be > 0".to_string(),
        ));
    }

    if config.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "queue_capacity must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates spool configuration
fn validate_spool_config(config: &SpoolConfig) -> Result<(), ConfigError> {
    if config.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sweep_interval_secs must be > 0".to_string(),
        ));
    }

    // A file younger than one sweep interval may still sit in the writer queue
    if config.grace_period_secs < config.sweep_interval_secs {
        return Err(ConfigError::Validation(format!(
            "grace_period_secs must be at least sweep_interval_secs ({}), got {}",
            config.sweep_interval_secs, config.grace_period_secs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
