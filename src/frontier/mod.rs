//! Frontier construction
//!
//! Builds the candidate-URL list for one crawl run: per source, sitemap
//! harvesting first (authoritative), index-page link harvesting as the
//! fallback when sitemaps yield less than half the per-domain cap. All
//! candidates are canonicalized and deduplicated through a Bloom filter;
//! the orchestrator then drops already-ingested URLs with a store check.
//!
//! One source failing never aborts the run, and an empty frontier is a
//! valid (if disappointing) result.

mod bloom;
mod harvest;
mod sitemap;

pub use bloom::BloomFilter;
pub use harvest::LinkHarvester;
pub use sitemap::{harvest_sitemaps, parse_sitemap, SitemapDoc, SitemapEntry, MAX_SITEMAP_CHILDREN};

use crate::fetch::FetchOptions;
use crate::store::SourceRecord;
use crate::url::{canonicalize_url, origin_for_domain};
use reqwest::Client;

/// Frontier builder for one run
pub struct FrontierBuilder {
    harvester: LinkHarvester,
}

impl FrontierBuilder {
    pub fn new() -> Self {
        Self {
            harvester: LinkHarvester::new(),
        }
    }

    /// Builds the deduplicated candidate list across `sources`.
    ///
    /// Candidates are canonical URLs, newest-first per source, capped at
    /// `max_urls_per_domain` each.
    pub async fn build(
        &self,
        client: &Client,
        sources: &[SourceRecord],
        freshness_hours: i64,
        max_urls_per_domain: usize,
        opts: &FetchOptions,
    ) -> Vec<String> {
        let mut seen = BloomFilter::with_capacity(sources.len() * max_urls_per_domain);
        let mut frontier = Vec::new();

        for source in sources {
            let harvested = self
                .harvest_source(client, source, freshness_hours, max_urls_per_domain, opts)
                .await;

            tracing::debug!(
                domain = %source.domain,
                candidates = harvested.len(),
                "harvested source"
            );

            for raw in harvested {
                let Ok(canonical) = canonicalize_url(&raw) else {
                    continue;
                };
                let canonical = canonical.to_string();
                if seen.insert(&canonical) {
                    frontier.push(canonical);
                }
            }
        }

        tracing::info!(urls = frontier.len(), "frontier built");
        frontier
    }

    /// Harvests one source: sitemaps first, index pages when the sitemap
    /// yield is under half the cap. Failures log and return what we have.
    async fn harvest_source(
        &self,
        client: &Client,
        source: &SourceRecord,
        freshness_hours: i64,
        max_urls: usize,
        opts: &FetchOptions,
    ) -> Vec<String> {
        let origin = match origin_for_domain(&source.domain) {
            Ok(origin) => origin,
            Err(e) => {
                tracing::warn!(domain = %source.domain, "unusable source domain: {}", e);
                return Vec::new();
            }
        };

        let mut urls = harvest_sitemaps(
            client,
            &origin,
            &source.hints.sitemap_paths,
            freshness_hours,
            max_urls,
            opts,
        )
        .await;

        if urls.len() < max_urls / 2 {
            tracing::debug!(
                domain = %source.domain,
                sitemap_urls = urls.len(),
                "sitemap yield below half cap, harvesting index pages"
            );

            let from_index = self
                .harvester
                .harvest_index_pages(client, &origin, &source.hints, max_urls - urls.len(), opts)
                .await;

            for url in from_index {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }

        urls.truncate(max_urls);
        urls
    }
}

impl Default for FrontierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceHints;

    fn source(domain: &str) -> SourceRecord {
        SourceRecord {
            id: 1,
            domain: domain.to_string(),
            hints: SourceHints::default(),
            points: 0,
            discovery_points: 0,
            enabled: true,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
        }
    }

    #[tokio::test]
    async fn test_bad_domain_yields_empty_not_error() {
        let builder = FrontierBuilder::new();
        let client = reqwest::Client::new();
        let sources = vec![source("not a domain at all")];

        let frontier = builder
            .build(
                &client,
                &sources,
                72,
                10,
                &FetchOptions::new(std::time::Duration::from_millis(200), 0),
            )
            .await;
        assert!(frontier.is_empty());
    }

    #[tokio::test]
    async fn test_no_sources_yields_empty_frontier() {
        let builder = FrontierBuilder::new();
        let client = reqwest::Client::new();
        let frontier = builder
            .build(
                &client,
                &[],
                72,
                10,
                &FetchOptions::new(std::time::Duration::from_millis(200), 0),
            )
            .await;
        assert!(frontier.is_empty());
    }
}
