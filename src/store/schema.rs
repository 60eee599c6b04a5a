//! Database schema definitions
//!
//! All SQL DDL for the Veilleur database. The schema enforces the
//! crate-level uniqueness invariants: canonical URLs, source domains,
//! topic slugs, and the (topic, article) / (source, topic) link pairs.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Configured subjects the crawler builds feeds for
CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    query TEXT NOT NULL,
    includes TEXT NOT NULL DEFAULT '[]',
    excludes TEXT NOT NULL DEFAULT '[]',
    freshness_hours INTEGER NOT NULL DEFAULT 72,
    max_items INTEGER NOT NULL DEFAULT 50,
    enabled INTEGER NOT NULL DEFAULT 1
);

-- Crawlable domains with crawl hints and reputation
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    hints TEXT NOT NULL DEFAULT '{}',
    points INTEGER NOT NULL DEFAULT 0,
    discovery_points INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    last_success_at TEXT,
    last_failure_at TEXT,
    created_at TEXT NOT NULL
);

-- Ingested articles; canonical_url is the exact-dedup key
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    published_at TEXT NOT NULL,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    lang TEXT,
    simhash INTEGER,
    paywalled INTEGER NOT NULL DEFAULT 0,
    first_seen_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_first_seen ON articles(first_seen_at);
CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source_id);

-- Feed membership
CREATE TABLE IF NOT EXISTS topic_articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    article_id INTEGER NOT NULL REFERENCES articles(id),
    added_at TEXT NOT NULL,
    hidden INTEGER NOT NULL DEFAULT 0,
    UNIQUE(topic_id, article_id)
);

CREATE INDEX IF NOT EXISTS idx_topic_articles_topic ON topic_articles(topic_id);

-- Which sources feed which topics
CREATE TABLE IF NOT EXISTS source_topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    UNIQUE(source_id, topic_id)
);

-- One row per orchestrator run; open -> closed, never reopened
CREATE TABLE IF NOT EXISTS crawls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    started_at TEXT NOT NULL,
    finished_at TEXT,
    ok INTEGER,
    stats_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawls_topic ON crawls(topic_id);

-- Discovered domains pending promotion to sources
CREATE TABLE IF NOT EXISTS candidate_domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    discovered_via TEXT NOT NULL,
    referrer_domain TEXT,
    score INTEGER NOT NULL DEFAULT 0,
    robots_state TEXT,
    first_seen_at TEXT NOT NULL
);

-- Probe snapshots for candidate domains
CREATE TABLE IF NOT EXISTS candidate_probes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    candidate_id INTEGER NOT NULL REFERENCES candidate_domains(id) ON DELETE CASCADE,
    probed_at TEXT NOT NULL,
    has_sitemap INTEGER NOT NULL,
    has_feed INTEGER NOT NULL,
    jsonld_news INTEGER NOT NULL,
    lastmod_recent INTEGER NOT NULL,
    lang TEXT,
    score INTEGER NOT NULL
);

-- Advisory lock leases, keyed by integer (topic id for crawl runs)
CREATE TABLE IF NOT EXISTS locks (
    key INTEGER PRIMARY KEY,
    acquired_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
