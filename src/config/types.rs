use serde::{Deserialize, Serialize};

/// Main configuration structure for Veilleur
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default, rename = "topic")]
    pub topics: Vec<TopicEntry>,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Timeout for full article/sitemap fetches (milliseconds)
    #[serde(rename = "fetch-timeout-ms", default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Timeout for discovery probes (milliseconds)
    #[serde(rename = "probe-timeout-ms", default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Retry budget for transient fetch failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Frontier cap per source domain
    #[serde(rename = "max-urls-per-domain", default = "default_max_urls_per_domain")]
    pub max_urls_per_domain: usize,

    /// Cooldown applied to a domain after a 429/403 (seconds)
    #[serde(rename = "cooldown-secs", default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
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

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Discovery engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Static seed domains always considered as candidates
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Aggregator pages mined for outbound links
    #[serde(default)]
    pub aggregators: Vec<String>,

    /// HTML search endpoint queried per enabled topic
    #[serde(rename = "search-base-url", default = "default_search_base_url")]
    pub search_base_url: String,

    /// Cap on newly probed candidates per discovery run
    #[serde(
        rename = "max-candidates-per-run",
        default = "default_max_candidates_per_run"
    )]
    pub max_candidates_per_run: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            aggregators: Vec::new(),
            search_base_url: default_search_base_url(),
            max_candidates_per_run: default_max_candidates_per_run(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

/// A topic the crawler builds a feed for. Admin-owned; upserted into the
/// store at startup and treated read-only by the crawl itself.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicEntry {
    pub slug: String,
    pub name: String,

    /// Whitespace-separated query keywords
    pub query: String,

    /// Keywords that boost a match (case-insensitive regex fragments)
    #[serde(default)]
    pub includes: Vec<String>,

    /// Keywords that penalize a match
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Freshness window for accepted articles (hours)
    #[serde(rename = "freshness-hours", default = "default_freshness_hours")]
    pub freshness_hours: i64,

    /// Feed output cap
    #[serde(rename = "max-items", default = "default_max_items")]
    pub max_items: usize,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A crawlable source domain with its crawl hints
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub domain: String,

    #[serde(flatten)]
    pub hints: SourceHints,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Crawl hints for a source.
///
/// An explicit struct with named fields rather than an open JSON map, so
/// malformed hints are rejected at the config boundary.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct SourceHints {
    /// Sitemap paths to try, in order ("/sitemap.xml" assumed when empty)
    #[serde(rename = "sitemap-paths", alias = "sitemap_paths", default)]
    pub sitemap_paths: Vec<String>,

    /// Index/category pages harvested when sitemaps come up short
    #[serde(rename = "index-paths", alias = "index_paths", default)]
    pub index_paths: Vec<String>,

    /// Learned regex matching this source's article paths
    #[serde(rename = "article-pattern", alias = "article_pattern", default)]
    pub article_pattern: Option<String>,

    /// Whether `article_pattern` was learned rather than hand-configured
    #[serde(default)]
    pub learned: bool,

    /// Confidence in the learned pattern, 0.0–1.0
    #[serde(default)]
    pub confidence: f64,
}

fn default_fetch_timeout_ms() -> u64 {
    15_000
}

fn default_probe_timeout_ms() -> u64 {
    8_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_urls_per_domain() -> usize {
    40
}

fn default_cooldown_secs() -> u64 {
    3_600
}

fn default_max_candidates_per_run() -> usize {
    50
}

fn default_freshness_hours() -> i64 {
    72
}

fn default_max_items() -> usize {
    50
}

fn default_true() -> bool {
    true
}
