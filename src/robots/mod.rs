//! Robots.txt handling module
//!
//! Fetching, parsing, and caching of robots.txt rules. The service is an
//! injected, concurrency-safe, domain-keyed cache shared by every topic
//! run in the process; tests construct their own. Entries live 24 hours.
//!
//! Fetch failures fail open: the domain gets allow-all rules with the
//! default 2s crawl delay, so an unreachable robots.txt never stalls a run.

mod cache;
mod parser;

pub use cache::CachedRules;
pub use parser::{RobotsRules, DEFAULT_CRAWL_DELAY};

use crate::fetch::{fetch, FetchOptions};
use crate::url::extract_domain;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Process-wide robots.txt service
pub struct RobotsService {
    client: Client,
    user_agent: String,
    timeout: Duration,
    cache: Mutex<HashMap<String, CachedRules>>,
}

impl RobotsService {
    pub fn new(client: Client, user_agent: String, timeout: Duration) -> Self {
        Self {
            client,
            user_agent,
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the rules for the domain of `url`, fetching robots.txt if
    /// the cache is missing or stale.
    pub async fn get(&self, url: &Url) -> RobotsRules {
        let key = domain_key(url);

        if let Some(cached) = self.lookup(&key) {
            return cached;
        }

        let rules = self.fetch_rules(url).await;
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(key, CachedRules::new(rules.clone()));
        rules
    }

    /// Checks whether `url` may be fetched according to its domain's rules
    pub async fn is_allowed(&self, url: &Url) -> bool {
        self.get(url).await.is_allowed(url.path())
    }

    /// Pre-seeds rules for a domain. Lets tests inject fakes and lets
    /// callers reuse rules obtained elsewhere.
    pub fn seed(&self, domain: &str, rules: RobotsRules) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(domain.to_string(), CachedRules::new(rules));
    }

    /// Drops all cached entries
    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.clear();
    }

    fn lookup(&self, key: &str) -> Option<RobotsRules> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(key)
            .filter(|cached| !cached.is_stale())
            .map(|cached| cached.rules.clone())
    }

    async fn fetch_rules(&self, url: &Url) -> RobotsRules {
        let robots_url = match url.join("/robots.txt") {
            Ok(u) => u,
            Err(_) => return RobotsRules::allow_all(),
        };

        let opts = FetchOptions::new(self.timeout, 1);
        match fetch(&self.client, robots_url.as_str(), &opts).await {
            Ok(response) if !response.not_modified => {
                tracing::debug!(domain = %domain_key(url), "fetched robots.txt");
                RobotsRules::parse(&response.body, &self.user_agent)
            }
            Ok(_) => RobotsRules::allow_all(),
            Err(e) => {
                // Fail-open: a missing or unreachable robots.txt must not
                // block the domain.
                tracing::debug!(domain = %domain_key(url), "robots.txt unavailable ({}), allowing all", e);
                RobotsRules::allow_all()
            }
        }
    }
}

/// Cache key for a URL: the same authority string that keys rate buckets
/// and source lookups
fn domain_key(url: &Url) -> String {
    extract_domain(url).unwrap_or_default()
}
