//! Index-page link harvesting
//!
//! Fallback for sources whose sitemaps come up short: fetch the
//! configured index/category pages and keep same-domain links whose paths
//! look like articles, dropping listing/utility paths.

use crate::config::SourceHints;
use crate::fetch::{fetch, FetchOptions};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

/// Paths that look like articles
const ARTICLE_PATH_PATTERN: &str = r"(?x)
    /news/
  | /article
  | /story
  | /actualites?/
  | /\d{4}/\d{2}/          # date-segmented archives
";

/// Listing and utility paths that are never articles
const EXCLUDED_PATH_PATTERN: &str = r"(?x)
    /(author|auteur|tag|tags|category|categorie|topics?|page|pages)/
  | /(login|signin|signup|register|account|search|recherche)
  | /(newsletter|abonnement|subscribe|rss|feed)\b
  | [?&]page=
";

/// Long hyphenated slugs ("/climate-summit-reaches-agreement") read as
/// article permalinks even without a recognized section prefix
const SLUG_HYPHEN_THRESHOLD: usize = 3;

/// Link harvester with compiled heuristics
pub struct LinkHarvester {
    article_path: Regex,
    excluded_path: Regex,
}

impl LinkHarvester {
    pub fn new() -> Self {
        Self {
            article_path: Regex::new(ARTICLE_PATH_PATTERN).unwrap(),
            excluded_path: Regex::new(EXCLUDED_PATH_PATTERN).unwrap(),
        }
    }

    /// Harvests article-looking URLs from a source's index pages.
    ///
    /// A failing index page is logged and skipped. Results are capped at
    /// `max_urls` and restricted to absolute same-domain URLs.
    pub async fn harvest_index_pages(
        &self,
        client: &Client,
        origin: &Url,
        hints: &SourceHints,
        max_urls: usize,
        opts: &FetchOptions,
    ) -> Vec<String> {
        let default_paths = vec!["/".to_string()];
        let paths = if hints.index_paths.is_empty() {
            &default_paths
        } else {
            &hints.index_paths
        };

        let learned_pattern = hints
            .article_pattern
            .as_deref()
            .and_then(|p| Regex::new(p).ok());

        let mut urls = Vec::new();

        for path in paths {
            if urls.len() >= max_urls {
                break;
            }

            let Ok(index_url) = origin.join(path) else {
                continue;
            };

            let body = match fetch(client, index_url.as_str(), opts).await {
                Ok(response) if !response.not_modified => response.body,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(url = %index_url, "index page fetch failed: {}", e);
                    continue;
                }
            };

            for link in self.extract_article_links(&body, origin, learned_pattern.as_ref()) {
                if urls.len() >= max_urls {
                    break;
                }
                if !urls.contains(&link) {
                    urls.push(link);
                }
            }
        }

        urls
    }

    /// Extracts same-domain article links from one page
    pub fn extract_article_links(
        &self,
        html: &str,
        origin: &Url,
        learned_pattern: Option<&Regex>,
    ) -> Vec<String> {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let mut links = Vec::new();
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with('#')
            {
                continue;
            }

            let Ok(absolute) = origin.join(href) else {
                continue;
            };
            if absolute.host_str() != origin.host_str() {
                continue;
            }

            if self.looks_like_article(absolute.path(), learned_pattern)
                && !self.is_excluded(absolute.as_str())
            {
                links.push(absolute.to_string());
            }
        }
        links
    }

    fn looks_like_article(&self, path: &str, learned_pattern: Option<&Regex>) -> bool {
        if let Some(pattern) = learned_pattern {
            if pattern.is_match(path) {
                return true;
            }
        }

        if self.article_path.is_match(path) {
            return true;
        }

        // Fall back to slug shape on the last path segment
        path.rsplit('/')
            .next()
            .map(|segment| segment.matches('-').count() >= SLUG_HYPHEN_THRESHOLD)
            .unwrap_or(false)
    }

    fn is_excluded(&self, url: &str) -> bool {
        self.excluded_path.is_match(url)
    }
}

impl Default for LinkHarvester {
    fn default() -> Self {
        Self::new()
    }
}
