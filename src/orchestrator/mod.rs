//! Crawl orchestration
//!
//! Drives one locked run per topic: frontier construction, polite
//! fetching, extraction, quality gating, dedup, and persistence, with
//! per-URL failure isolation and a guaranteed crawl-row close + lock
//! release on every exit path.
//!
//! The advisory lock is the store-backed lease, so at most one run per
//! topic holds cluster-wide no matter how many worker processes invoke
//! the orchestrator.

use crate::config::{Config, CrawlerConfig};
use crate::dedup::{check_duplicate, DedupDecision};
use crate::extract::Extract;
use crate::fetch::{fetch, FetchError, FetchOptions};
use crate::frontier::FrontierBuilder;
use crate::limiter::RateLimiter;
use crate::quality::QualityGate;
use crate::robots::RobotsService;
use crate::store::{NewArticle, Store, TopicRecord};
use crate::url::extract_domain;
use crate::{CrawlError, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Lease TTL for the per-topic advisory lock. Bounds how long a crashed
/// run can block its topic.
const LOCK_TTL_SECS: i64 = 3600;

/// Stats for one orchestrator run (or an aggregate across topics)
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunStats {
    pub kept: u64,
    pub skipped_duplicates: u64,
    pub skipped_quality: u64,
    pub errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawl_id: Option<i64>,
}

impl RunStats {
    /// Zero-stat result for a run skipped on lock contention
    pub fn skipped() -> Self {
        Self::default()
    }

    /// Folds another run's counters into an aggregate
    pub fn merge(&mut self, other: &RunStats) {
        self.kept += other.kept;
        self.skipped_duplicates += other.skipped_duplicates;
        self.skipped_quality += other.skipped_quality;
        self.errors += other.errors;
    }
}

/// Outcome of processing one frontier URL
enum UrlOutcome {
    Kept,
    SkippedQuality,
    SkippedDuplicate,
    RobotsDenied,
}

/// The crawl orchestrator. Holds the shared services; one instance can
/// run any number of topics, sequentially or from concurrent tasks.
pub struct Orchestrator<S: Store> {
    store: Arc<Mutex<S>>,
    client: Client,
    robots: Arc<RobotsService>,
    limiter: Arc<RateLimiter>,
    extractor: Arc<dyn Extract>,
    gate: QualityGate,
    frontier: FrontierBuilder,
    config: CrawlerConfig,
}

impl<S: Store> Orchestrator<S> {
    pub fn new(
        store: Arc<Mutex<S>>,
        client: Client,
        robots: Arc<RobotsService>,
        limiter: Arc<RateLimiter>,
        extractor: Arc<dyn Extract>,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            store,
            client,
            robots,
            limiter,
            extractor,
            gate: QualityGate::new(),
            frontier: FrontierBuilder::new(),
            config,
        }
    }

    /// Runs one topic by slug, or every enabled topic sequentially when
    /// no slug is given. One topic's failure never stops the rest; the
    /// aggregate carries no crawl id.
    pub async fn run_topic(&self, slug: Option<&str>) -> Result<RunStats> {
        match slug {
            Some(slug) => {
                let topic = self
                    .with_store(|store| store.get_topic_by_slug(slug))?
                    .ok_or_else(|| CrawlError::TopicNotFound(slug.to_string()))?;
                self.run_single(&topic).await
            }
            None => {
                let topics = self.with_store(|store| store.list_enabled_topics())?;
                let mut aggregate = RunStats::default();

                for topic in &topics {
                    match self.run_single(topic).await {
                        Ok(stats) => aggregate.merge(&stats),
                        Err(e) => {
                            tracing::error!(topic = %topic.slug, "topic run failed: {}", e);
                            aggregate.errors += 1;
                        }
                    }
                }
                Ok(aggregate)
            }
        }
    }

    /// One locked run for one topic
    async fn run_single(&self, topic: &TopicRecord) -> Result<RunStats> {
        let acquired =
            self.with_store(|store| store.try_acquire_lock(topic.id, LOCK_TTL_SECS))?;
        if !acquired {
            tracing::info!(topic = %topic.slug, "another run holds the topic lock, skipping");
            return Ok(RunStats::skipped());
        }

        // Opening the crawl row is the only fatal step past the lock;
        // release before propagating.
        let crawl_id = match self.with_store(|store| store.open_crawl(topic.id)) {
            Ok(id) => id,
            Err(e) => {
                let _ = self.with_store(|store| store.release_lock(topic.id));
                return Err(e.into());
            }
        };

        tracing::info!(topic = %topic.slug, crawl_id, "crawl started");

        let mut stats = RunStats {
            crawl_id: Some(crawl_id),
            ..RunStats::default()
        };
        let outcome = self.crawl_topic(topic, &mut stats).await;

        // Guaranteed cleanup: the row is closed and the lock released on
        // every exit path, success or not.
        let stats_json =
            serde_json::to_string(&stats).unwrap_or_else(|_| "{}".to_string());
        if let Err(e) =
            self.with_store(|store| store.close_crawl(crawl_id, outcome.is_ok(), &stats_json))
        {
            tracing::error!(crawl_id, "failed to close crawl row: {}", e);
        }
        if let Err(e) = self.with_store(|store| store.release_lock(topic.id)) {
            tracing::error!(topic = %topic.slug, "failed to release topic lock: {}", e);
        }

        outcome?;
        tracing::info!(
            topic = %topic.slug,
            crawl_id,
            kept = stats.kept,
            skipped_duplicates = stats.skipped_duplicates,
            skipped_quality = stats.skipped_quality,
            errors = stats.errors,
            "crawl finished"
        );
        Ok(stats)
    }

    /// Frontier construction plus the sequential per-URL pipeline
    async fn crawl_topic(&self, topic: &TopicRecord, stats: &mut RunStats) -> Result<()> {
        let sources = self.with_store(|store| store.sources_for_topic(topic.id))?;
        if sources.is_empty() {
            tracing::warn!(topic = %topic.slug, "no enabled sources linked to topic");
            return Ok(());
        }

        let fetch_opts = FetchOptions::new(
            Duration::from_millis(self.config.fetch_timeout_ms),
            self.config.max_retries,
        );

        let candidates = self
            .frontier
            .build(
                &self.client,
                &sources,
                topic.freshness_hours,
                self.config.max_urls_per_domain,
                &fetch_opts,
            )
            .await;

        let frontier = self.with_store(|store| store.filter_unseen_urls(&candidates))?;
        tracing::info!(
            topic = %topic.slug,
            candidates = candidates.len(),
            frontier = frontier.len(),
            "frontier filtered against store"
        );

        for url in &frontier {
            match self.process_url(topic, url, &fetch_opts).await {
                Ok(UrlOutcome::Kept) => stats.kept += 1,
                Ok(UrlOutcome::SkippedQuality) => stats.skipped_quality += 1,
                Ok(UrlOutcome::SkippedDuplicate) => stats.skipped_duplicates += 1,
                Ok(UrlOutcome::RobotsDenied) => {
                    tracing::debug!(url = %url, "disallowed by robots.txt");
                }
                Err(e) => {
                    // Per-URL failures are isolated; the run continues
                    tracing::warn!(url = %url, "url failed: {}", e);
                    stats.errors += 1;
                }
            }
        }

        Ok(())
    }

    /// The per-URL pipeline: robots -> pacing -> fetch -> extract ->
    /// gate -> dedup -> persist
    async fn process_url(
        &self,
        topic: &TopicRecord,
        url: &str,
        fetch_opts: &FetchOptions,
    ) -> Result<UrlOutcome> {
        let parsed = Url::parse(url)?;
        let domain = extract_domain(&parsed).ok_or(crate::UrlError::MissingDomain)?;

        let rules = self.robots.get(&parsed).await;
        if !rules.is_allowed(parsed.path()) {
            return Ok(UrlOutcome::RobotsDenied);
        }

        let wait = self.limiter.delay_for(&domain).max(rules.crawl_delay);
        if wait > Duration::ZERO {
            tokio::time::sleep(wait).await;
        }

        let source = self.with_store(|store| store.get_source_by_domain(&domain))?;

        let response = match fetch(&self.client, url, fetch_opts).await {
            Ok(response) => response,
            Err(e) => {
                if let FetchError::RateLimited { status, .. } = &e {
                    tracing::warn!(url, status, "domain rate limited, setting cooldown");
                    self.limiter.set_cooldown(&domain);
                }
                if let Some(source) = &source {
                    let id = source.id;
                    self.with_store(|store| store.record_source_failure(id))?;
                }
                return Err(e.into());
            }
        };

        if response.not_modified {
            return Ok(UrlOutcome::SkippedQuality);
        }

        let Some(extracted) = self.extractor.extract(&parsed, &response.body) else {
            return Ok(UrlOutcome::SkippedQuality);
        };

        if !self.gate.is_article(&extracted, topic, chrono::Utc::now()) {
            return Ok(UrlOutcome::SkippedQuality);
        }

        let decision = self.with_store(|store| {
            check_duplicate(&*store, url, &extracted.title, &extracted.summary)
        })?;
        let simhash = match decision {
            DedupDecision::Fresh { simhash } => simhash,
            DedupDecision::ExactDuplicate => return Ok(UrlOutcome::SkippedDuplicate),
            DedupDecision::NearDuplicate { distance } => {
                tracing::debug!(url, distance, "near duplicate rejected");
                return Ok(UrlOutcome::SkippedDuplicate);
            }
        };

        // First-seen source upsert: articles may come from a domain we
        // have not explicitly configured (e.g. a sitemap pointing at a
        // sibling host).
        let source_id = match source {
            Some(source) => source.id,
            None => self.with_store(|store| {
                store.upsert_source(&domain, &Default::default(), true)
            })?,
        };

        let article = NewArticle {
            canonical_url: url.to_string(),
            title: extracted.title,
            summary: extracted.summary,
            // Gate guarantees presence
            published_at: extracted.published_at.unwrap_or_else(chrono::Utc::now),
            source_id,
            lang: extracted.lang,
            simhash,
            paywalled: extracted.paywalled,
        };

        let inserted = self.with_store(|store| {
            let Some(article_id) = store.insert_article(&article)? else {
                return Ok(None);
            };
            store.link_topic_article(topic.id, article_id)?;
            store.record_source_success(source_id)?;
            Ok(Some(article_id))
        })?;

        match inserted {
            Some(article_id) => {
                tracing::debug!(url, article_id, "article kept");
                Ok(UrlOutcome::Kept)
            }
            // Lost an insert race with a concurrent run
            None => Ok(UrlOutcome::SkippedDuplicate),
        }
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&mut S) -> crate::store::StoreResult<T>,
    ) -> std::result::Result<T, crate::store::StoreError> {
        let mut guard = self.store.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

/// Upserts configured topics and sources into the store and links every
/// configured source to every configured topic. Called at startup before
/// any run.
pub fn sync_config<S: Store>(store: &mut S, config: &Config) -> Result<()> {
    let mut topic_ids = Vec::new();
    for topic in &config.topics {
        topic_ids.push(store.upsert_topic(topic)?);
    }

    for source in &config.sources {
        let source_id = store.upsert_source(&source.domain, &source.hints, source.enabled)?;
        for topic_id in &topic_ids {
            store.link_source_topic(source_id, *topic_id)?;
        }
    }

    tracing::info!(
        topics = config.topics.len(),
        sources = config.sources.len(),
        "config synced to store"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicEntry;
    use crate::extract::Extracted;
    use crate::store::SqliteStore;

    struct NoopExtractor;

    impl Extract for NoopExtractor {
        fn extract(&self, _url: &Url, _html: &str) -> Option<Extracted> {
            None
        }
    }

    fn test_orchestrator() -> (Orchestrator<SqliteStore>, Arc<Mutex<SqliteStore>>) {
        let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
        let client = Client::new();
        let robots = Arc::new(RobotsService::new(
            client.clone(),
            "TestBot/1.0".to_string(),
            Duration::from_secs(2),
        ));
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(3600)));
        let config = CrawlerConfig {
            fetch_timeout_ms: 2_000,
            probe_timeout_ms: 1_000,
            max_retries: 0,
            max_urls_per_domain: 10,
            cooldown_secs: 3_600,
        };
        let orchestrator = Orchestrator::new(
            store.clone(),
            client,
            robots,
            limiter,
            Arc::new(NoopExtractor),
            config,
        );
        (orchestrator, store)
    }

    fn seed_topic(store: &Arc<Mutex<SqliteStore>>, slug: &str) -> i64 {
        let mut guard = store.lock().unwrap();
        guard
            .upsert_topic(&TopicEntry {
                slug: slug.to_string(),
                name: slug.to_string(),
                query: "climate".to_string(),
                includes: vec![],
                excludes: vec![],
                freshness_hours: 72,
                max_items: 50,
                enabled: true,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_topic_is_fatal() {
        let (orchestrator, _) = test_orchestrator();
        let result = orchestrator.run_topic(Some("missing")).await;
        assert!(matches!(result, Err(CrawlError::TopicNotFound(_))));
    }

    #[tokio::test]
    async fn test_lock_contention_yields_zero_stat_skip() {
        let (orchestrator, store) = test_orchestrator();
        let topic_id = seed_topic(&store, "climate");

        // Simulate another process holding the topic lock
        store
            .lock()
            .unwrap()
            .try_acquire_lock(topic_id, 600)
            .unwrap();

        let stats = orchestrator.run_topic(Some("climate")).await.unwrap();
        assert_eq!(stats, RunStats::skipped());

        // No crawl row was opened
        assert!(store.lock().unwrap().recent_crawls(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_without_sources_closes_crawl_ok() {
        let (orchestrator, store) = test_orchestrator();
        let topic_id = seed_topic(&store, "climate");

        let stats = orchestrator.run_topic(Some("climate")).await.unwrap();
        assert_eq!(stats.kept, 0);
        assert!(stats.crawl_id.is_some());

        let crawls = store.lock().unwrap().recent_crawls(10).unwrap();
        assert_eq!(crawls.len(), 1);
        assert_eq!(crawls[0].ok, Some(true));
        assert!(crawls[0].finished_at.is_some());

        // Lock was released: a fresh acquire succeeds
        assert!(store
            .lock()
            .unwrap()
            .try_acquire_lock(topic_id, 600)
            .unwrap());
    }

    #[tokio::test]
    async fn test_fan_out_covers_all_enabled_topics() {
        let (orchestrator, store) = test_orchestrator();
        seed_topic(&store, "one");
        seed_topic(&store, "two");

        let stats = orchestrator.run_topic(None).await.unwrap();
        assert!(stats.crawl_id.is_none());

        let crawls = store.lock().unwrap().recent_crawls(10).unwrap();
        assert_eq!(crawls.len(), 2);
    }

    #[tokio::test]
    async fn test_sync_config_links_sources_to_topics() {
        let (_, store) = test_orchestrator();
        let config_toml = r#"
[crawler]

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0"
contact-url = "https://example.com/bot"
contact-email = "bot@example.com"

[storage]
database-path = ":memory:"

[[topic]]
slug = "climate"
name = "Climate"
query = "climate"

[[source]]
domain = "news.example.com"
"#;
        let config: Config = toml::from_str(config_toml).unwrap();

        {
            let mut guard = store.lock().unwrap();
            sync_config(&mut *guard, &config).unwrap();
        }

        let guard = store.lock().unwrap();
        let topic = guard.get_topic_by_slug("climate").unwrap().unwrap();
        let sources = guard.sources_for_topic(topic.id).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].domain, "news.example.com");
    }
}
