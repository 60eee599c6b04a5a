//! Duplicate detection
//!
//! Two layers: exact rejection on an already-ingested canonical URL, and
//! near-duplicate rejection by SimHash distance against every article
//! ingested in the trailing seven days. The near check is a linear scan
//! over the window, which is fine at expected volumes.
//!
//! This module is the sole producer of article simhashes: the hash that
//! gets persisted with a fresh article is the one computed here from
//! `title + " " + summary`.

mod simhash;

pub use simhash::{hamming_distance, simhash64};

use crate::store::{Store, StoreError};
use chrono::{Duration, Utc};

/// Articles closer than this many bits are duplicates
pub const NEAR_DUPLICATE_THRESHOLD: u32 = 3;

/// Trailing window scanned for near duplicates
pub const NEAR_DUPLICATE_WINDOW_DAYS: i64 = 7;

/// Outcome of a dedup check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// Not a duplicate; carries the simhash to persist with the article
    Fresh { simhash: u64 },

    /// Canonical URL already ingested
    ExactDuplicate,

    /// Within the Hamming threshold of a recent article
    NearDuplicate { distance: u32 },
}

impl DedupDecision {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, DedupDecision::Fresh { .. })
    }
}

/// Checks a candidate article against the store.
///
/// Exact check first (cheap index lookup), then the SimHash scan over the
/// seven-day window.
pub fn check_duplicate<S: Store + ?Sized>(
    store: &S,
    canonical_url: &str,
    title: &str,
    summary: &str,
) -> Result<DedupDecision, StoreError> {
    if store.article_exists(canonical_url)? {
        return Ok(DedupDecision::ExactDuplicate);
    }

    let candidate = simhash64(&format!("{} {}", title, summary));

    let since = Utc::now() - Duration::days(NEAR_DUPLICATE_WINDOW_DAYS);
    for existing in store.recent_simhashes(since)? {
        let distance = hamming_distance(candidate, existing);
        if distance < NEAR_DUPLICATE_THRESHOLD {
            return Ok(DedupDecision::NearDuplicate { distance });
        }
    }

    Ok(DedupDecision::Fresh { simhash: candidate })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewArticle, SqliteStore, Store};
    use chrono::Utc;

    fn store_with_source() -> (SqliteStore, i64) {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let source_id = store
            .upsert_source("news.example.com", &Default::default(), true)
            .unwrap();
        (store, source_id)
    }

    fn sample_article(source_id: i64, url: &str, title: &str, summary: &str) -> NewArticle {
        NewArticle {
            canonical_url: url.to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            published_at: Utc::now(),
            source_id,
            lang: Some("en".to_string()),
            simhash: simhash64(&format!("{} {}", title, summary)),
            paywalled: false,
        }
    }

    #[test]
    fn test_fresh_article_accepted() {
        let (store, _) = store_with_source();
        let decision = check_duplicate(
            &store,
            "https://news.example.com/story",
            "Climate summit reaches agreement",
            "Delegates from nearly two hundred countries agreed on new targets.",
        )
        .unwrap();
        assert!(matches!(decision, DedupDecision::Fresh { .. }));
    }

    #[test]
    fn test_exact_duplicate_rejected() {
        let (mut store, source_id) = store_with_source();
        let article = sample_article(
            source_id,
            "https://news.example.com/story",
            "Climate summit reaches agreement",
            "Delegates agreed on new targets after marathon talks.",
        );
        store.insert_article(&article).unwrap();

        let decision = check_duplicate(
            &store,
            "https://news.example.com/story",
            "Completely different title here",
            "Completely different summary text without any overlap at all.",
        )
        .unwrap();
        assert_eq!(decision, DedupDecision::ExactDuplicate);
    }

    #[test]
    fn test_near_duplicate_rejected() {
        let (mut store, source_id) = store_with_source();
        let title = "Climate summit reaches historic agreement on emissions";
        let summary = "Delegates from nearly two hundred countries agreed on binding \
                       targets after two weeks of negotiation in Geneva late on Friday";
        store
            .insert_article(&sample_article(
                source_id,
                "https://news.example.com/a",
                title,
                summary,
            ))
            .unwrap();

        // Identical text under a different URL: distance 0
        let decision =
            check_duplicate(&store, "https://other.example.com/b", title, summary).unwrap();
        assert!(matches!(decision, DedupDecision::NearDuplicate { distance: 0 }));
    }

    #[test]
    fn test_distinct_article_passes_near_check() {
        let (mut store, source_id) = store_with_source();
        store
            .insert_article(&sample_article(
                source_id,
                "https://news.example.com/a",
                "Climate summit reaches historic agreement on emissions targets",
                "Delegates from nearly two hundred countries agreed on binding targets \
                 after two weeks of negotiation between world leaders in Geneva",
            ))
            .unwrap();

        let decision = check_duplicate(
            &store,
            "https://news.example.com/b",
            "Chipmaker raises guidance as datacenter demand surges",
            "Quarterly earnings beat analyst expectations as cloud revenue grew sharply \
             and the company raised its outlook for the remainder of the fiscal year",
        )
        .unwrap();
        assert!(matches!(decision, DedupDecision::Fresh { .. }));
    }
}
