//! SQLite store implementation

use crate::config::{SourceHints, TopicEntry};
use crate::store::schema::initialize_schema;
use crate::store::traits::{Store, StoreError, StoreResult};
use crate::store::{
    ArticleRecord, CandidateRecord, CrawlRecord, FeedItem, NewArticle, ProbeSnapshot,
    SourceRecord, TopicRecord,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// In-memory database for tests
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn topic_from_row(row: &Row) -> rusqlite::Result<TopicRecord> {
        Ok(TopicRecord {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            query: row.get(3)?,
            includes: parse_string_list(&row.get::<_, String>(4)?),
            excludes: parse_string_list(&row.get::<_, String>(5)?),
            freshness_hours: row.get(6)?,
            max_items: row.get(7)?,
            enabled: row.get::<_, i64>(8)? != 0,
        })
    }

    fn source_from_row(row: &Row) -> rusqlite::Result<SourceRecord> {
        Ok(SourceRecord {
            id: row.get(0)?,
            domain: row.get(1)?,
            hints: serde_json::from_str(&row.get::<_, String>(2)?).unwrap_or_default(),
            points: row.get(3)?,
            discovery_points: row.get(4)?,
            enabled: row.get::<_, i64>(5)? != 0,
            consecutive_failures: row.get(6)?,
            last_success_at: parse_timestamp_opt(row.get::<_, Option<String>>(7)?),
            last_failure_at: parse_timestamp_opt(row.get::<_, Option<String>>(8)?),
        })
    }

    fn article_from_row(row: &Row) -> rusqlite::Result<ArticleRecord> {
        Ok(ArticleRecord {
            id: row.get(0)?,
            canonical_url: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            published_at: parse_timestamp(&row.get::<_, String>(4)?),
            source_id: row.get(5)?,
            lang: row.get(6)?,
            simhash: row.get::<_, Option<i64>>(7)?.map(|v| v as u64),
            paywalled: row.get::<_, i64>(8)? != 0,
            first_seen_at: parse_timestamp(&row.get::<_, String>(9)?),
        })
    }
}

const TOPIC_COLUMNS: &str =
    "id, slug, name, query, includes, excludes, freshness_hours, max_items, enabled";

const SOURCE_COLUMNS: &str = "id, domain, hints, points, discovery_points, enabled, \
     consecutive_failures, last_success_at, last_failure_at";

const ARTICLE_COLUMNS: &str = "id, canonical_url, title, summary, published_at, source_id, \
     lang, simhash, paywalled, first_seen_at";

impl Store for SqliteStore {
    // ===== Topics =====

    fn upsert_topic(&mut self, topic: &TopicEntry) -> StoreResult<i64> {
        let includes = serde_json::to_string(&topic.includes)?;
        let excludes = serde_json::to_string(&topic.excludes)?;

        self.conn.execute(
            "INSERT INTO topics (slug, name, query, includes, excludes, freshness_hours, max_items, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(slug) DO UPDATE SET
                 name = excluded.name,
                 query = excluded.query,
                 includes = excluded.includes,
                 excludes = excluded.excludes,
                 freshness_hours = excluded.freshness_hours,
                 max_items = excluded.max_items,
                 enabled = excluded.enabled",
            params![
                topic.slug,
                topic.name,
                topic.query,
                includes,
                excludes,
                topic.freshness_hours,
                topic.max_items as i64,
                topic.enabled as i64,
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM topics WHERE slug = ?1",
            params![topic.slug],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_topic_by_slug(&self, slug: &str) -> StoreResult<Option<TopicRecord>> {
        let sql = format!("SELECT {} FROM topics WHERE slug = ?1", TOPIC_COLUMNS);
        let topic = self
            .conn
            .query_row(&sql, params![slug], Self::topic_from_row)
            .optional()?;
        Ok(topic)
    }

    fn list_enabled_topics(&self) -> StoreResult<Vec<TopicRecord>> {
        let sql = format!(
            "SELECT {} FROM topics WHERE enabled = 1 ORDER BY id",
            TOPIC_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let topics = stmt
            .query_map([], Self::topic_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(topics)
    }

    // ===== Sources =====

    fn upsert_source(
        &mut self,
        domain: &str,
        hints: &SourceHints,
        enabled: bool,
    ) -> StoreResult<i64> {
        let hints_json = serde_json::to_string(hints)?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO sources (domain, hints, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(domain) DO UPDATE SET
                 hints = excluded.hints,
                 enabled = excluded.enabled",
            params![domain, hints_json, enabled as i64, now],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM sources WHERE domain = ?1",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_source_by_domain(&self, domain: &str) -> StoreResult<Option<SourceRecord>> {
        let sql = format!("SELECT {} FROM sources WHERE domain = ?1", SOURCE_COLUMNS);
        let source = self
            .conn
            .query_row(&sql, params![domain], Self::source_from_row)
            .optional()?;
        Ok(source)
    }

    fn list_source_domains(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT domain FROM sources")?;
        let domains = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(domains)
    }

    fn sources_for_topic(&self, topic_id: i64) -> StoreResult<Vec<SourceRecord>> {
        let sql = "SELECT s.id, s.domain, s.hints, s.points, s.discovery_points, s.enabled, \
                          s.consecutive_failures, s.last_success_at, s.last_failure_at
             FROM sources s
             JOIN source_topics st ON st.source_id = s.id
             WHERE st.topic_id = ?1 AND s.enabled = 1
             ORDER BY s.id";
        let mut stmt = self.conn.prepare(sql)?;
        let sources = stmt
            .query_map(params![topic_id], Self::source_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sources)
    }

    fn link_source_topic(&mut self, source_id: i64, topic_id: i64) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO source_topics (source_id, topic_id) VALUES (?1, ?2)
             ON CONFLICT(source_id, topic_id) DO NOTHING",
            params![source_id, topic_id],
        )?;
        Ok(())
    }

    fn record_source_success(&mut self, source_id: i64) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE sources SET points = points + 1, consecutive_failures = 0,
                 last_success_at = ?1
             WHERE id = ?2",
            params![now, source_id],
        )?;
        Ok(())
    }

    fn record_source_failure(&mut self, source_id: i64) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE sources SET consecutive_failures = consecutive_failures + 1,
                 last_failure_at = ?1
             WHERE id = ?2",
            params![now, source_id],
        )?;
        Ok(())
    }

    fn add_discovery_points(&mut self, source_id: i64, points: i64) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE sources SET discovery_points = discovery_points + ?1 WHERE id = ?2",
            params![points, source_id],
        )?;
        Ok(())
    }

    fn source_points_range(&self) -> StoreResult<Option<(i64, i64)>> {
        let range: Option<(Option<i64>, Option<i64>)> = self
            .conn
            .query_row("SELECT MIN(points), MAX(points) FROM sources", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        Ok(match range {
            Some((Some(min), Some(max))) => Some((min, max)),
            _ => None,
        })
    }

    // ===== Articles =====

    fn article_exists(&self, canonical_url: &str) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE canonical_url = ?1",
            params![canonical_url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn filter_unseen_urls(&self, urls: &[String]) -> StoreResult<Vec<String>> {
        let mut unseen = Vec::with_capacity(urls.len());
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM articles WHERE canonical_url = ?1")?;

        for url in urls {
            let seen = stmt
                .query_row(params![url], |_| Ok(()))
                .optional()?
                .is_some();
            if !seen {
                unseen.push(url.clone());
            }
        }
        Ok(unseen)
    }

    fn insert_article(&mut self, article: &NewArticle) -> StoreResult<Option<i64>> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT INTO articles
                 (canonical_url, title, summary, published_at, source_id, lang, simhash, paywalled, first_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(canonical_url) DO NOTHING",
            params![
                article.canonical_url,
                article.title,
                article.summary,
                article.published_at.to_rfc3339(),
                article.source_id,
                article.lang,
                article.simhash as i64,
                article.paywalled as i64,
                now,
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    fn recent_simhashes(&self, since: DateTime<Utc>) -> StoreResult<Vec<u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT simhash FROM articles
             WHERE simhash IS NOT NULL AND first_seen_at >= ?1",
        )?;
        let hashes = stmt
            .query_map(params![since.to_rfc3339()], |row| {
                row.get::<_, i64>(0).map(|v| v as u64)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hashes)
    }

    fn recent_article_urls(&self, limit: usize) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT canonical_url FROM articles ORDER BY first_seen_at DESC LIMIT ?1",
        )?;
        let urls = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(urls)
    }

    fn link_topic_article(&mut self, topic_id: i64, article_id: i64) -> StoreResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT INTO topic_articles (topic_id, article_id, added_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(topic_id, article_id) DO NOTHING",
            params![topic_id, article_id, now],
        )?;
        Ok(inserted > 0)
    }

    fn feed(
        &self,
        topic_id: i64,
        freshness_hours: i64,
        max_items: i64,
    ) -> StoreResult<Vec<FeedItem>> {
        let cutoff = (Utc::now() - Duration::hours(freshness_hours)).to_rfc3339();
        let sql = "SELECT a.id, a.canonical_url, a.title, a.summary, a.published_at, \
                          a.source_id, a.lang, a.simhash, a.paywalled, a.first_seen_at, s.points
             FROM articles a
             JOIN topic_articles ta ON ta.article_id = a.id
             JOIN sources s ON s.id = a.source_id
             WHERE ta.topic_id = ?1 AND ta.hidden = 0 AND a.published_at >= ?2
             ORDER BY a.published_at DESC
             LIMIT ?3";

        let mut stmt = self.conn.prepare(sql)?;
        let items = stmt
            .query_map(params![topic_id, cutoff, max_items], |row| {
                Ok(FeedItem {
                    article: Self::article_from_row(row)?,
                    source_points: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    // ===== Crawls =====

    fn open_crawl(&mut self, topic_id: i64) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawls (topic_id, started_at) VALUES (?1, ?2)",
            params![topic_id, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn close_crawl(&mut self, crawl_id: i64, ok: bool, stats_json: &str) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawls SET finished_at = ?1, ok = ?2, stats_json = ?3
             WHERE id = ?4 AND finished_at IS NULL",
            params![now, ok as i64, stats_json, crawl_id],
        )?;

        if updated == 0 {
            return Err(StoreError::CrawlNotFound(crawl_id));
        }
        Ok(())
    }

    fn recent_crawls(&self, limit: usize) -> StoreResult<Vec<CrawlRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, topic_id, started_at, finished_at, ok, stats_json
             FROM crawls ORDER BY id DESC LIMIT ?1",
        )?;
        let crawls = stmt
            .query_map(params![limit as i64], |row| {
                Ok(CrawlRecord {
                    id: row.get(0)?,
                    topic_id: row.get(1)?,
                    started_at: parse_timestamp(&row.get::<_, String>(2)?),
                    finished_at: parse_timestamp_opt(row.get::<_, Option<String>>(3)?),
                    ok: row.get::<_, Option<i64>>(4)?.map(|v| v != 0),
                    stats_json: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(crawls)
    }

    // ===== Advisory lock =====

    fn try_acquire_lock(&mut self, key: i64, ttl_secs: i64) -> StoreResult<bool> {
        let now = Utc::now();

        // Sweep expired leases first so a crashed holder cannot wedge
        // the key past its TTL.
        self.conn.execute(
            "DELETE FROM locks WHERE key = ?1 AND expires_at <= ?2",
            params![key, now.to_rfc3339()],
        )?;

        let expires_at = (now + Duration::seconds(ttl_secs)).to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT INTO locks (key, acquired_at, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO NOTHING",
            params![key, now.to_rfc3339(), expires_at],
        )?;

        Ok(inserted > 0)
    }

    fn release_lock(&mut self, key: i64) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM locks WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ===== Candidate domains =====

    fn known_candidate_domains(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT domain FROM candidate_domains")?;
        let domains = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(domains)
    }

    fn upsert_candidate(
        &mut self,
        domain: &str,
        discovered_via: &str,
        referrer_domain: Option<&str>,
    ) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO candidate_domains (domain, discovered_via, referrer_domain, first_seen_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(domain) DO NOTHING",
            params![domain, discovered_via, referrer_domain, now],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM candidate_domains WHERE domain = ?1",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_candidate(&self, domain: &str) -> StoreResult<Option<CandidateRecord>> {
        let candidate = self
            .conn
            .query_row(
                "SELECT id, domain, discovered_via, referrer_domain, score, robots_state, first_seen_at
                 FROM candidate_domains WHERE domain = ?1",
                params![domain],
                |row| {
                    Ok(CandidateRecord {
                        id: row.get(0)?,
                        domain: row.get(1)?,
                        discovered_via: row.get(2)?,
                        referrer_domain: row.get(3)?,
                        score: row.get(4)?,
                        robots_state: row.get(5)?,
                        first_seen_at: parse_timestamp(&row.get::<_, String>(6)?),
                    })
                },
            )
            .optional()?;
        Ok(candidate)
    }

    fn record_probe(&mut self, candidate_id: i64, probe: &ProbeSnapshot) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO candidate_probes
                 (candidate_id, probed_at, has_sitemap, has_feed, jsonld_news, lastmod_recent, lang, score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                candidate_id,
                now,
                probe.has_sitemap as i64,
                probe.has_feed as i64,
                probe.jsonld_news as i64,
                probe.lastmod_recent as i64,
                probe.lang,
                probe.score,
            ],
        )?;
        Ok(())
    }

    fn raise_candidate_score(&mut self, candidate_id: i64, score: i64) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE candidate_domains SET score = MAX(score, ?1) WHERE id = ?2",
            params![score, candidate_id],
        )?;
        Ok(())
    }

    fn set_candidate_robots_state(&mut self, candidate_id: i64, state: &str) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE candidate_domains SET robots_state = ?1 WHERE id = ?2",
            params![state, candidate_id],
        )?;
        Ok(())
    }

    fn delete_candidate(&mut self, candidate_id: i64) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM candidate_probes WHERE candidate_id = ?1",
            params![candidate_id],
        )?;
        self.conn.execute(
            "DELETE FROM candidate_domains WHERE id = ?1",
            params![candidate_id],
        )?;
        Ok(())
    }

    // ===== Operator stats =====

    fn count_articles(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_sources(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sources", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_candidates(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM candidate_domains", [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }

    fn get_article_by_url(&self, canonical_url: &str) -> StoreResult<Option<ArticleRecord>> {
        let sql = format!(
            "SELECT {} FROM articles WHERE canonical_url = ?1",
            ARTICLE_COLUMNS
        );
        let article = self
            .conn
            .query_row(&sql, params![canonical_url], Self::article_from_row)
            .optional()?;
        Ok(article)
    }
}

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_timestamp_opt(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
