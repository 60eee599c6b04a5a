//! Store trait and error types

use crate::config::{SourceHints, TopicEntry};
use crate::store::{
    ArticleRecord, CandidateRecord, CrawlRecord, FeedItem, NewArticle, ProbeSnapshot,
    SourceRecord, TopicRecord,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Crawl not found: {0}")]
    CrawlNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence interface for the crawl and discovery pipelines.
///
/// Reads take `&self`, writes `&mut self`; callers that share a store
/// across tasks wrap it in `Arc<Mutex<..>>`.
pub trait Store {
    // ===== Topics =====

    /// Inserts or updates a topic from config; returns its id
    fn upsert_topic(&mut self, topic: &TopicEntry) -> StoreResult<i64>;

    fn get_topic_by_slug(&self, slug: &str) -> StoreResult<Option<TopicRecord>>;

    fn list_enabled_topics(&self) -> StoreResult<Vec<TopicRecord>>;

    // ===== Sources =====

    /// Inserts a source or updates its hints/enabled flag; returns its id
    fn upsert_source(&mut self, domain: &str, hints: &SourceHints, enabled: bool)
        -> StoreResult<i64>;

    fn get_source_by_domain(&self, domain: &str) -> StoreResult<Option<SourceRecord>>;

    /// All source domains, promoted or configured, enabled or not.
    /// Discovery dedups its candidates against this list.
    fn list_source_domains(&self) -> StoreResult<Vec<String>>;

    /// Enabled sources linked to a topic
    fn sources_for_topic(&self, topic_id: i64) -> StoreResult<Vec<SourceRecord>>;

    fn link_source_topic(&mut self, source_id: i64, topic_id: i64) -> StoreResult<()>;

    /// Bumps reputation points and the success timestamp, resetting the
    /// failure streak. Called by the orchestrator on first-insert only.
    fn record_source_success(&mut self, source_id: i64) -> StoreResult<()>;

    /// Bumps the failure streak and timestamp
    fn record_source_failure(&mut self, source_id: i64) -> StoreResult<()>;

    /// Awards discovery points (referral credit). Discovery engine only.
    fn add_discovery_points(&mut self, source_id: i64, points: i64) -> StoreResult<()>;

    /// (min, max) reputation points across all sources, None when empty
    fn source_points_range(&self) -> StoreResult<Option<(i64, i64)>>;

    // ===== Articles =====

    fn article_exists(&self, canonical_url: &str) -> StoreResult<bool>;

    /// Drops URLs that are already ingested; preserves input order
    fn filter_unseen_urls(&self, urls: &[String]) -> StoreResult<Vec<String>>;

    /// Inserts an article unless its canonical URL exists. Returns the
    /// new id, or None when the conflict clause suppressed the insert.
    fn insert_article(&mut self, article: &NewArticle) -> StoreResult<Option<i64>>;

    /// Simhashes of all articles first seen since `since`
    fn recent_simhashes(&self, since: DateTime<Utc>) -> StoreResult<Vec<u64>>;

    /// Most recently ingested article URLs, newest first
    fn recent_article_urls(&self, limit: usize) -> StoreResult<Vec<String>>;

    /// Links an article into a topic feed. Returns false when the pair
    /// already existed.
    fn link_topic_article(&mut self, topic_id: i64, article_id: i64) -> StoreResult<bool>;

    /// Read-only feed surface: non-hidden topic articles inside the
    /// freshness window, newest first, capped at `max_items`
    fn feed(&self, topic_id: i64, freshness_hours: i64, max_items: i64)
        -> StoreResult<Vec<FeedItem>>;

    // ===== Crawls =====

    /// Opens a crawl row for a run
    fn open_crawl(&mut self, topic_id: i64) -> StoreResult<i64>;

    /// Closes a crawl row. Rows are closed exactly once, never reopened.
    fn close_crawl(&mut self, crawl_id: i64, ok: bool, stats_json: &str) -> StoreResult<()>;

    fn recent_crawls(&self, limit: usize) -> StoreResult<Vec<CrawlRecord>>;

    // ===== Advisory lock =====

    /// Non-blocking try-acquire of the lease keyed by `key`. The TTL
    /// bounds how long a crashed holder can wedge the key.
    fn try_acquire_lock(&mut self, key: i64, ttl_secs: i64) -> StoreResult<bool>;

    fn release_lock(&mut self, key: i64) -> StoreResult<()>;

    // ===== Candidate domains =====

    fn known_candidate_domains(&self) -> StoreResult<Vec<String>>;

    /// Inserts a candidate if new; returns its id either way
    fn upsert_candidate(
        &mut self,
        domain: &str,
        discovered_via: &str,
        referrer_domain: Option<&str>,
    ) -> StoreResult<i64>;

    fn get_candidate(&self, domain: &str) -> StoreResult<Option<CandidateRecord>>;

    fn record_probe(&mut self, candidate_id: i64, probe: &ProbeSnapshot) -> StoreResult<()>;

    /// Updates the candidate score to the running max of old and new
    fn raise_candidate_score(&mut self, candidate_id: i64, score: i64) -> StoreResult<()>;

    fn set_candidate_robots_state(&mut self, candidate_id: i64, state: &str) -> StoreResult<()>;

    /// Removes a candidate (and its probes) after promotion
    fn delete_candidate(&mut self, candidate_id: i64) -> StoreResult<()>;

    // ===== Operator stats =====

    fn count_articles(&self) -> StoreResult<u64>;
    fn count_sources(&self) -> StoreResult<u64>;
    fn count_candidates(&self) -> StoreResult<u64>;

    /// Article lookup by canonical URL (used by feed assembly and tests)
    fn get_article_by_url(&self, canonical_url: &str) -> StoreResult<Option<ArticleRecord>>;
}
