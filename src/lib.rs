//! Veilleur: a polite topical news crawler
//!
//! This crate crawls configured source domains for articles relevant to
//! configured topics, deduplicates and quality-filters them, ranks them,
//! and runs a discovery loop that finds new candidate sources. It respects
//! robots.txt and per-domain rate limits, and backs everything with a
//! SQLite store.

pub mod config;
pub mod dedup;
pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod limiter;
pub mod orchestrator;
pub mod quality;
pub mod robots;
pub mod store;
pub mod url;

use thiserror::Error;

/// Main error type for Veilleur operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Store(#[from] store::StoreError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Sitemap parse error for {url}: {message}")]
    SitemapParse { url: String, message: String },

    #[error("Stats serialization error: {0}")]
    StatsJson(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
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

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Veilleur operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use discovery::{DiscoveryEngine, DiscoveryStats};
pub use orchestrator::{Orchestrator, RunStats};
pub use self::url::{canonicalize_url, extract_domain};
