//! robots.txt cache entries
//!
//! Fetched rules are kept per domain for 24 hours before a refetch, so a
//! site's changes to its robots.txt are picked up within a day.

use crate::robots::RobotsRules;
use chrono::{DateTime, Duration, Utc};

/// Cached robots.txt rules for a domain
#[derive(Debug, Clone)]
pub struct CachedRules {
    pub rules: RobotsRules,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRules {
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    /// True once the entry is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}
