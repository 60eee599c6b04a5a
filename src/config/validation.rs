use crate::config::types::{
    Config, CrawlerConfig, DiscoveryConfig, SourceEntry, TopicEntry, UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_topics(&config.topics)?;
    validate_sources(&config.sources)?;
    validate_discovery_config(&config.discovery)?;

    if config.storage.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.fetch_timeout_ms < 1_000 || config.fetch_timeout_ms > 120_000 {
        return Err(ConfigError::Validation(format!(
            "fetch-timeout-ms must be between 1000 and 120000, got {}",
            config.fetch_timeout_ms
        )));
    }

    if config.probe_timeout_ms < 1_000 || config.probe_timeout_ms > config.fetch_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "probe-timeout-ms must be between 1000 and fetch-timeout-ms, got {}",
            config.probe_timeout_ms
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.max_urls_per_domain < 1 {
        return Err(ConfigError::Validation(
            "max-urls-per-domain must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_topics(topics: &[TopicEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for topic in topics {
        if topic.slug.is_empty()
            || !topic
                .slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::Validation(format!(
                "topic slug must be non-empty lowercase kebab-case, got '{}'",
                topic.slug
            )));
        }

        if !seen.insert(topic.slug.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate topic slug '{}'",
                topic.slug
            )));
        }

        if topic.query.split_whitespace().next().is_none() {
            return Err(ConfigError::Validation(format!(
                "topic '{}' must have a non-empty query",
                topic.slug
            )));
        }

        if topic.freshness_hours < 1 {
            return Err(ConfigError::Validation(format!(
                "topic '{}': freshness-hours must be >= 1, got {}",
                topic.slug, topic.freshness_hours
            )));
        }

        if topic.max_items < 1 {
            return Err(ConfigError::Validation(format!(
                "topic '{}': max-items must be >= 1",
                topic.slug
            )));
        }

        for keyword in topic.includes.iter().chain(topic.excludes.iter()) {
            regex::RegexBuilder::new(keyword)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    ConfigError::InvalidPattern(format!(
                        "topic '{}': keyword '{}' is not a valid pattern: {}",
                        topic.slug, keyword, e
                    ))
                })?;
        }
    }

    Ok(())
}

fn validate_sources(sources: &[SourceEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        validate_domain_string(&source.domain)?;

        if !seen.insert(source.domain.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source domain '{}'",
                source.domain
            )));
        }

        for path in source
            .hints
            .sitemap_paths
            .iter()
            .chain(source.hints.index_paths.iter())
        {
            if !path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "source '{}': path '{}' must start with '/'",
                    source.domain, path
                )));
            }
        }

        if let Some(pattern) = &source.hints.article_pattern {
            regex::Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidPattern(format!(
                    "source '{}': article-pattern is not a valid regex: {}",
                    source.domain, e
                ))
            })?;
        }

        if !(0.0..=1.0).contains(&source.hints.confidence) {
            return Err(ConfigError::Validation(format!(
                "source '{}': confidence must be within 0.0..=1.0",
                source.domain
            )));
        }
    }

    Ok(())
}

fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    for seed in &config.seeds {
        validate_domain_string(seed)?;
    }

    for aggregator in &config.aggregators {
        Url::parse(aggregator)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid aggregator URL: {}", e)))?;
    }

    Url::parse(&config.search_base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid search-base-url: {}", e)))?;

    if config.max_candidates_per_run < 1 || config.max_candidates_per_run > 200 {
        return Err(ConfigError::Validation(format!(
            "max-candidates-per-run must be between 1 and 200, got {}",
            config.max_candidates_per_run
        )));
    }

    Ok(())
}

/// Validates a bare domain string (no scheme, no path)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation: local@domain with a dotted domain part
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid contact-email: '{}'",
            email
        )));
    }
    Ok(())
}
