//! Source discovery
//!
//! Finds candidate domains that might be worth crawling: outbound links
//! mined from recently ingested articles, a static seed list, search
//! result pages built from each enabled topic's query, and configured
//! aggregator pages. Candidates are deduplicated against existing
//! sources, probed for crawlability signals, scored, and auto-promoted to
//! sources once they reach the promotion threshold.
//!
//! This module is the sole writer of discovery points and candidate rows.

use crate::config::DiscoveryConfig;
use crate::extract::{has_news_jsonld, page_lang};
use crate::fetch::{fetch, FetchOptions};
use crate::frontier::{parse_sitemap, SitemapDoc};
use crate::store::{ProbeSnapshot, Store};
use crate::url::origin_for_domain;
use crate::Result;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use url::Url;

/// Candidates at or above this score become sources
pub const PROMOTION_THRESHOLD: i64 = 60;

/// Probe signal weights
const SITEMAP_POINTS: i64 = 30;
const LASTMOD_RECENT_POINTS: i64 = 20;
const FEED_POINTS: i64 = 15;
const JSONLD_POINTS: i64 = 25;
const LANG_POINTS: i64 = 10;

/// A sitemap lastmod within this window counts as recent
const LASTMOD_RECENT_DAYS: i64 = 7;

/// Recent articles mined for outbound links per run
const RECENT_ARTICLE_LIMIT: usize = 100;

/// Common feed locations, tried in order
const FEED_PATHS: &[&str] = &["/feed", "/rss", "/rss.xml", "/atom.xml", "/feed.xml"];

/// Hosts that are link infrastructure, never news sources
const SKIP_HOSTS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "youtube.com",
    "instagram.com",
    "linkedin.com",
    "t.me",
    "wikipedia.org",
    "google.com",
    "duckduckgo.com",
    "archive.org",
];

/// Stats for one discovery run
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub candidates_found: u64,
    pub candidates_probed: u64,
    pub auto_promoted: u64,
    pub errors: u64,
}

/// A harvested candidate before probing
#[derive(Debug, Clone)]
struct Candidate {
    domain: String,
    discovered_via: String,
    referrer_domain: Option<String>,
}

/// The discovery engine
pub struct DiscoveryEngine<S: Store> {
    store: Arc<Mutex<S>>,
    client: Client,
    config: DiscoveryConfig,
    probe_opts: FetchOptions,
}

impl<S: Store> DiscoveryEngine<S> {
    pub fn new(
        store: Arc<Mutex<S>>,
        client: Client,
        config: DiscoveryConfig,
        probe_opts: FetchOptions,
    ) -> Self {
        Self {
            store,
            client,
            config,
            probe_opts,
        }
    }

    /// One discovery run: harvest, dedup, probe, promote
    pub async fn run(&self) -> Result<DiscoveryStats> {
        let mut stats = DiscoveryStats::default();

        let known: HashSet<String> = self
            .with_store(|store| store.list_source_domains())?
            .into_iter()
            .collect();

        let mut candidates = self.gather_candidates(&mut stats).await?;
        candidates.retain(|c| !known.contains(&c.domain));
        dedup_candidates(&mut candidates);
        candidates.truncate(self.config.max_candidates_per_run);

        stats.candidates_found = candidates.len() as u64;
        tracing::info!(candidates = candidates.len(), "candidate domains gathered");

        for candidate in &candidates {
            match self.probe_candidate(candidate).await {
                Ok(promoted) => {
                    stats.candidates_probed += 1;
                    if promoted {
                        stats.auto_promoted += 1;
                    }
                }
                Err(e) => {
                    // One domain's probe failure never aborts the batch
                    tracing::warn!(domain = %candidate.domain, "probe failed: {}", e);
                    stats.errors += 1;
                }
            }
        }

        tracing::info!(
            found = stats.candidates_found,
            probed = stats.candidates_probed,
            promoted = stats.auto_promoted,
            errors = stats.errors,
            "discovery run finished"
        );
        Ok(stats)
    }

    /// Harvests candidate domains from all four channels
    async fn gather_candidates(&self, stats: &mut DiscoveryStats) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        // 1. Outbound links from recent articles
        let recent = self.with_store(|store| store.recent_article_urls(RECENT_ARTICLE_LIMIT))?;
        for article_url in &recent {
            let Ok(parsed) = Url::parse(article_url) else {
                continue;
            };
            let referrer = parsed.host_str().map(|h| h.to_lowercase());

            match fetch(&self.client, article_url, &self.probe_opts).await {
                Ok(response) if !response.not_modified => {
                    for domain in external_domains(&response.body, &parsed) {
                        candidates.push(Candidate {
                            domain,
                            discovered_via: "outbound-link".to_string(),
                            referrer_domain: referrer.clone(),
                        });
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(url = %article_url, "outbound mining fetch failed: {}", e);
                    stats.errors += 1;
                }
            }
        }

        // 2. Static seed list
        for seed in &self.config.seeds {
            candidates.push(Candidate {
                domain: seed.to_lowercase(),
                discovered_via: "seed".to_string(),
                referrer_domain: None,
            });
        }

        // 3. Search results per enabled topic
        let topics = self.with_store(|store| store.list_enabled_topics())?;
        for topic in &topics {
            let Ok(search_url) = Url::parse_with_params(
                &self.config.search_base_url,
                &[("q", format!("{} news", topic.query))],
            ) else {
                continue;
            };

            match fetch(&self.client, search_url.as_str(), &self.probe_opts).await {
                Ok(response) if !response.not_modified => {
                    for domain in search_result_domains(&response.body) {
                        candidates.push(Candidate {
                            domain,
                            discovered_via: format!("search:{}", topic.slug),
                            referrer_domain: None,
                        });
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(topic = %topic.slug, "search fetch failed: {}", e);
                    stats.errors += 1;
                }
            }
        }

        // 4. Aggregator pages
        for aggregator in &self.config.aggregators {
            let Ok(base) = Url::parse(aggregator) else {
                continue;
            };
            match fetch(&self.client, aggregator, &self.probe_opts).await {
                Ok(response) if !response.not_modified => {
                    for domain in external_domains(&response.body, &base) {
                        candidates.push(Candidate {
                            domain,
                            discovered_via: "aggregator".to_string(),
                            referrer_domain: None,
                        });
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(url = %aggregator, "aggregator fetch failed: {}", e);
                    stats.errors += 1;
                }
            }
        }

        Ok(candidates)
    }

    /// Probes one candidate and promotes it when it clears the threshold.
    /// Returns whether a promotion happened.
    async fn probe_candidate(&self, candidate: &Candidate) -> Result<bool> {
        let origin = origin_for_domain(&candidate.domain)?;

        let candidate_id = self.with_store(|store| {
            store.upsert_candidate(
                &candidate.domain,
                &candidate.discovered_via,
                candidate.referrer_domain.as_deref(),
            )
        })?;

        let mut probe = ProbeSnapshot::default();

        // Sitemap presence and recency
        if let Ok(sitemap_url) = origin.join("/sitemap.xml") {
            if let Ok(response) = fetch(&self.client, sitemap_url.as_str(), &self.probe_opts).await
            {
                if let Ok(doc) = parse_sitemap(&response.body) {
                    probe.has_sitemap = true;
                    probe.lastmod_recent = sitemap_has_recent_lastmod(&doc);
                }
            }
        }

        // Any common feed path
        for path in FEED_PATHS {
            let Ok(feed_url) = origin.join(path) else {
                continue;
            };
            if fetch(&self.client, feed_url.as_str(), &self.probe_opts)
                .await
                .is_ok()
            {
                probe.has_feed = true;
                break;
            }
        }

        // Homepage signals: JSON-LD news typing and a declared language
        let robots_state;
        match fetch(&self.client, origin.as_str(), &self.probe_opts).await {
            Ok(response) => {
                probe.jsonld_news = has_news_jsonld(&response.body);
                probe.lang = page_lang(&response.body);
                robots_state = self.probe_robots(&origin).await;
            }
            Err(e) => {
                tracing::debug!(domain = %candidate.domain, "homepage probe failed: {}", e);
                robots_state = "unreachable".to_string();
            }
        }

        probe.score = score_probe(&probe);

        self.with_store(|store| {
            store.record_probe(candidate_id, &probe)?;
            store.raise_candidate_score(candidate_id, probe.score)?;
            store.set_candidate_robots_state(candidate_id, &robots_state)
        })?;

        tracing::debug!(
            domain = %candidate.domain,
            score = probe.score,
            has_sitemap = probe.has_sitemap,
            has_feed = probe.has_feed,
            jsonld_news = probe.jsonld_news,
            "candidate probed"
        );

        if probe.score >= PROMOTION_THRESHOLD {
            self.promote(candidate, candidate_id)?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn probe_robots(&self, origin: &Url) -> String {
        let Ok(robots_url) = origin.join("/robots.txt") else {
            return "unreachable".to_string();
        };
        match fetch(&self.client, robots_url.as_str(), &self.probe_opts).await {
            Ok(_) => "present".to_string(),
            Err(_) => "absent".to_string(),
        }
    }

    /// Creates the source, links it to the first enabled topic, rewards
    /// the referrer, and removes the candidate rows.
    fn promote(&self, candidate: &Candidate, candidate_id: i64) -> Result<()> {
        self.with_store(|store| {
            let source_id = store.upsert_source(&candidate.domain, &Default::default(), true)?;

            if let Some(topic) = store.list_enabled_topics()?.into_iter().next() {
                store.link_source_topic(source_id, topic.id)?;
            }

            if let Some(referrer) = &candidate.referrer_domain {
                if let Some(referrer_source) = store.get_source_by_domain(referrer)? {
                    store.add_discovery_points(referrer_source.id, 1)?;
                }
            }

            store.delete_candidate(candidate_id)
        })?;

        tracing::info!(domain = %candidate.domain, "candidate auto-promoted to source");
        Ok(())
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&mut S) -> crate::store::StoreResult<T>,
    ) -> std::result::Result<T, crate::store::StoreError> {
        let mut guard = self.store.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

/// Computes the probe score from its signals
pub fn score_probe(probe: &ProbeSnapshot) -> i64 {
    let mut score = 0;
    if probe.has_sitemap {
        score += SITEMAP_POINTS;
        if probe.lastmod_recent {
            score += LASTMOD_RECENT_POINTS;
        }
    }
    if probe.has_feed {
        score += FEED_POINTS;
    }
    if probe.jsonld_news {
        score += JSONLD_POINTS;
        if probe.lang.is_some() {
            score += LANG_POINTS;
        }
    }
    score
}

/// True when any entry (or index child) carries a lastmod within the
/// recency window
fn sitemap_has_recent_lastmod(doc: &SitemapDoc) -> bool {
    let cutoff = Utc::now() - ChronoDuration::days(LASTMOD_RECENT_DAYS);
    let entries = match doc {
        SitemapDoc::Urls(entries) => entries,
        SitemapDoc::Index(entries) => entries,
    };
    entries
        .iter()
        .any(|e| e.lastmod.map(|lm| lm >= cutoff).unwrap_or(false))
}

/// Mines external link domains from a page
fn external_domains(html: &str, page_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let page_host = page_url.host_str().map(|h| h.to_lowercase());
    let mut domains = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(absolute) = page_url.join(href) else {
            continue;
        };
        let Some(host) = absolute.host_str().map(|h| h.to_lowercase()) else {
            continue;
        };

        if Some(&host) == page_host.as_ref() || !plausible_domain(&host) || is_skip_host(&host) {
            continue;
        }
        domains.push(host);
    }
    domains
}

/// Extracts result-link domains from a DuckDuckGo HTML results page,
/// unwrapping the `uddg` redirect parameter
fn search_result_domains(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut domains = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let target = if href.contains("uddg=") {
            let Ok(wrapper) = Url::parse(&format!("https:{}", href))
                .or_else(|_| Url::parse(href))
            else {
                continue;
            };
            match wrapper
                .query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.to_string())
            {
                Some(unwrapped) => unwrapped,
                None => continue,
            }
        } else {
            href.to_string()
        };

        let Ok(parsed) = Url::parse(&target) else {
            continue;
        };
        let Some(host) = parsed.host_str().map(|h| h.to_lowercase()) else {
            continue;
        };
        if plausible_domain(&host) && !is_skip_host(&host) {
            domains.push(host);
        }
    }
    domains
}

fn plausible_domain(host: &str) -> bool {
    host.contains('.')
        && !host.ends_with('.')
        && host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
}

fn is_skip_host(host: &str) -> bool {
    SKIP_HOSTS
        .iter()
        .any(|skip| host == *skip || host.ends_with(&format!(".{}", skip)))
}

fn dedup_candidates(candidates: &mut Vec<Candidate>) {
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.domain.clone()));
}
