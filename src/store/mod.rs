//! Persistence module
//!
//! Records, the [`Store`] trait, the SQLite schema, and the rusqlite
//! implementation. The store also provides the advisory-lock lease used
//! for cross-process mutual exclusion of topic runs.

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteStore;
pub use traits::{Store, StoreError, StoreResult};

use crate::config::SourceHints;
use chrono::{DateTime, Utc};

/// A configured topic, as stored
#[derive(Debug, Clone)]
pub struct TopicRecord {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub query: String,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub freshness_hours: i64,
    pub max_items: i64,
    pub enabled: bool,
}

/// A crawlable source, as stored
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: i64,
    pub domain: String,
    pub hints: SourceHints,
    pub points: i64,
    pub discovery_points: i64,
    pub enabled: bool,
    pub consecutive_failures: i64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// An ingested article, as stored
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub id: i64,
    pub canonical_url: String,
    pub title: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    pub source_id: i64,
    pub lang: Option<String>,
    pub simhash: Option<u64>,
    pub paywalled: bool,
    pub first_seen_at: DateTime<Utc>,
}

/// A new article ready for insertion. The simhash comes from the dedup
/// engine, which is its sole producer.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub canonical_url: String,
    pub title: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    pub source_id: i64,
    pub lang: Option<String>,
    pub simhash: u64,
    pub paywalled: bool,
}

/// One orchestrator run
#[derive(Debug, Clone)]
pub struct CrawlRecord {
    pub id: i64,
    pub topic_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub ok: Option<bool>,
    pub stats_json: Option<String>,
}

/// A discovered domain pending promotion
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub id: i64,
    pub domain: String,
    pub discovered_via: String,
    pub referrer_domain: Option<String>,
    pub score: i64,
    pub robots_state: Option<String>,
    pub first_seen_at: DateTime<Utc>,
}

/// Result of probing a candidate domain once
#[derive(Debug, Clone, Default)]
pub struct ProbeSnapshot {
    pub has_sitemap: bool,
    pub has_feed: bool,
    pub jsonld_news: bool,
    pub lastmod_recent: bool,
    pub lang: Option<String>,
    pub score: i64,
}

/// A feed row: the article plus its source's reputation for ranking
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub article: ArticleRecord,
    pub source_points: i64,
}
