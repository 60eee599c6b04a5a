//! Sitemap harvesting
//!
//! Sitemaps are the authoritative URL feed for a source. Sitemap indexes
//! are expanded recursively with "news"-named children first and at most
//! five children per index; `<url>` entries are filtered by `<lastmod>`
//! against the topic's freshness window and returned newest first.

use crate::fetch::{fetch, FetchOptions};
use chrono::{DateTime, Duration, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use url::Url;

/// Children expanded per sitemap index
pub const MAX_SITEMAP_CHILDREN: usize = 5;

/// Recursion guard for pathological index chains
const MAX_SITEMAP_DEPTH: usize = 4;

/// One `<url>` or `<sitemap>` entry
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

/// A parsed sitemap document
#[derive(Debug, PartialEq)]
pub enum SitemapDoc {
    /// `<urlset>`: concrete page URLs
    Urls(Vec<SitemapEntry>),
    /// `<sitemapindex>`: child sitemap locations
    Index(Vec<SitemapEntry>),
}

/// Parses a sitemap or sitemap-index document
pub fn parse_sitemap(xml: &str) -> Result<SitemapDoc, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut is_index = false;
    let mut saw_root = false;
    let mut entries: Vec<SitemapEntry> = Vec::new();

    let mut in_entry = false;
    let mut current_tag: Option<&'static str> = None;
    let mut loc = String::new();
    let mut lastmod: Option<DateTime<Utc>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"urlset" => {
                    saw_root = true;
                    is_index = false;
                }
                b"sitemapindex" => {
                    saw_root = true;
                    is_index = true;
                }
                b"url" | b"sitemap" => {
                    in_entry = true;
                    loc.clear();
                    lastmod = None;
                }
                b"loc" if in_entry => current_tag = Some("loc"),
                b"lastmod" if in_entry => current_tag = Some("lastmod"),
                _ => {}
            },
            Ok(Event::Text(text)) => {
                let value = text.unescape().map_err(|e| e.to_string())?;
                match current_tag {
                    Some("loc") => loc.push_str(value.trim()),
                    Some("lastmod") => lastmod = parse_lastmod(value.trim()),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"url" | b"sitemap" => {
                    if !loc.is_empty() {
                        entries.push(SitemapEntry {
                            loc: loc.clone(),
                            lastmod,
                        });
                    }
                    in_entry = false;
                }
                b"loc" | b"lastmod" => current_tag = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }

    if !saw_root {
        return Err("not a sitemap document".to_string());
    }

    Ok(if is_index {
        SitemapDoc::Index(entries)
    } else {
        SitemapDoc::Urls(entries)
    })
}

/// Harvests article URLs for one source from its sitemaps.
///
/// Individual sitemap failures are logged and skipped; the result is
/// whatever could be harvested, capped at `max_urls`.
pub async fn harvest_sitemaps(
    client: &Client,
    origin: &Url,
    sitemap_paths: &[String],
    freshness_hours: i64,
    max_urls: usize,
    opts: &FetchOptions,
) -> Vec<String> {
    let default_paths = vec!["/sitemap.xml".to_string()];
    let paths: &[String] = if sitemap_paths.is_empty() {
        &default_paths
    } else {
        sitemap_paths
    };

    // (url, depth) work list; indexes push their children back on
    let mut pending: Vec<(Url, usize)> = paths
        .iter()
        .filter_map(|path| origin.join(path).ok())
        .map(|u| (u, 0))
        .collect();

    let cutoff = Utc::now() - Duration::hours(freshness_hours);
    let mut harvested: Vec<SitemapEntry> = Vec::new();

    while let Some((sitemap_url, depth)) = pending.pop() {
        let response = match fetch(client, sitemap_url.as_str(), opts).await {
            Ok(r) if !r.not_modified => r,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(url = %sitemap_url, "sitemap fetch failed: {}", e);
                continue;
            }
        };

        match parse_sitemap(&response.body) {
            Ok(SitemapDoc::Urls(entries)) => {
                harvested.extend(
                    entries
                        .into_iter()
                        .filter(|e| e.lastmod.map(|lm| lm >= cutoff).unwrap_or(true)),
                );
            }
            Ok(SitemapDoc::Index(mut children)) => {
                if depth + 1 >= MAX_SITEMAP_DEPTH {
                    tracing::warn!(url = %sitemap_url, "sitemap index nested too deep, skipping children");
                    continue;
                }

                // News-named children first, then newest first
                children.sort_by(|a, b| {
                    let a_news = a.loc.to_lowercase().contains("news");
                    let b_news = b.loc.to_lowercase().contains("news");
                    b_news
                        .cmp(&a_news)
                        .then_with(|| b.lastmod.cmp(&a.lastmod))
                });

                for child in children.into_iter().take(MAX_SITEMAP_CHILDREN) {
                    if let Ok(child_url) = Url::parse(&child.loc) {
                        pending.push((child_url, depth + 1));
                    }
                }
            }
            Err(e) => {
                tracing::debug!(url = %sitemap_url, "sitemap parse failed: {}", e);
            }
        }
    }

    // Newest first; entries without a lastmod sort last
    harvested.sort_by(|a, b| b.lastmod.cmp(&a.lastmod));
    harvested.truncate(max_urls);
    harvested.into_iter().map(|e| e.loc).collect()
}

/// Accepts W3C datetime (RFC 3339) or a bare date
fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/a</loc><lastmod>2026-08-05</lastmod></url>
              <url><loc>https://example.com/b</loc></url>
            </urlset>"#;

        let doc = parse_sitemap(xml).unwrap();
        let SitemapDoc::Urls(entries) = doc else {
            panic!("expected urlset");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].loc, "https://example.com/a");
        assert!(entries[0].lastmod.is_some());
        assert!(entries[1].lastmod.is_none());
    }

    #[test]
    fn test_parse_sitemapindex() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>https://example.com/sitemap-news.xml</loc>
                       <lastmod>2026-08-05T10:00:00Z</lastmod></sitemap>
              <sitemap><loc>https://example.com/sitemap-archive.xml</loc></sitemap>
            </sitemapindex>"#;

        let doc = parse_sitemap(xml).unwrap();
        let SitemapDoc::Index(children) = doc else {
            panic!("expected index");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_parse_rejects_non_sitemap() {
        assert!(parse_sitemap("<html><body>nope</body></html>").is_err());
        assert!(parse_sitemap("not xml at all").is_err());
    }

    #[test]
    fn test_parse_lastmod_formats() {
        assert!(parse_lastmod("2026-08-05").is_some());
        assert!(parse_lastmod("2026-08-05T10:30:00Z").is_some());
        assert!(parse_lastmod("2026-08-05T10:30:00+02:00").is_some());
        assert!(parse_lastmod("August 5th").is_none());
    }

    #[test]
    fn test_entry_without_loc_dropped() {
        let xml = r#"<urlset><url><lastmod>2026-08-05</lastmod></url>
                     <url><loc>https://example.com/a</loc></url></urlset>"#;
        let SitemapDoc::Urls(entries) = parse_sitemap(xml).unwrap() else {
            panic!("expected urlset");
        };
        assert_eq!(entries.len(), 1);
    }
}
