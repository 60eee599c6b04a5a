use crate::extract::Extracted;
use crate::store::TopicRecord;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;

/// Titles shorter than this are noise
pub const MIN_TITLE_CHARS: usize = 10;

/// Summary word-count bounds for a real article
pub const MIN_SUMMARY_WORDS: usize = 150;
pub const MAX_SUMMARY_WORDS: usize = 3000;

/// Editorial content markers, English and French
const BLACKLIST_PATTERN: &str = r"(?i)\b(opinion|editorial|édito|éditorial|tribune|chronique|sponsored|sponsorisé|advertorial|publireportage|paid post|contenu partenaire)\b";

/// Article-vs-noise filter.
///
/// Owns its compiled blacklist so the regex is built once per process,
/// not once per URL.
pub struct QualityGate {
    blacklist: Regex,
}

impl QualityGate {
    pub fn new() -> Self {
        Self {
            // The pattern is a compile-time constant; it either always
            // compiles or never does.
            blacklist: Regex::new(BLACKLIST_PATTERN).unwrap(),
        }
    }

    /// Decides whether an extracted page is an article worth keeping for
    /// the topic. Deterministic in (article, topic, now); the checks are
    /// AND-ed so their order never changes the outcome.
    pub fn is_article(&self, article: &Extracted, topic: &TopicRecord, now: DateTime<Utc>) -> bool {
        if article.title.chars().count() < MIN_TITLE_CHARS {
            return false;
        }

        let Some(published_at) = article.published_at else {
            return false;
        };
        if now - published_at > Duration::hours(topic.freshness_hours) {
            return false;
        }

        let words = article.summary.split_whitespace().count();
        if !(MIN_SUMMARY_WORDS..=MAX_SUMMARY_WORDS).contains(&words) {
            return false;
        }

        let haystack = format!("{} {}", article.title, article.summary);
        if self.blacklist.is_match(&haystack) {
            return false;
        }

        true
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new()
    }
}
