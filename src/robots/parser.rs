//! robots.txt parser
//!
//! Parses robots.txt content into explicit allow/disallow rule lists plus
//! the crawl delay. Matching uses prefix specificity: the longest matching
//! rule wins, and Allow beats Disallow on an equal-specificity match.

use std::time::Duration;

/// Crawl delay assumed when robots.txt does not specify one (also the
/// fail-open default when robots.txt cannot be fetched)
pub const DEFAULT_CRAWL_DELAY: Duration = Duration::from_secs(2);

/// Parsed robots.txt rules for one user agent
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Effective crawl delay for our user agent
    pub crawl_delay: Duration,

    /// Path prefixes explicitly allowed
    pub allow: Vec<String>,

    /// Path prefixes disallowed
    pub disallow: Vec<String>,
}

impl RobotsRules {
    /// Permissive rules: everything allowed, default crawl delay.
    /// Used when robots.txt is missing or cannot be fetched (fail-open).
    pub fn allow_all() -> Self {
        Self {
            crawl_delay: DEFAULT_CRAWL_DELAY,
            allow: Vec::new(),
            disallow: Vec::new(),
        }
    }

    /// Parses robots.txt content for the given user agent.
    ///
    /// Rule groups are keyed by `User-agent` lines; a group whose agent
    /// token is contained in our user agent string is specific to us and
    /// takes precedence over the `*` group. Unknown directives are
    /// ignored.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let normalized_agent = user_agent.to_lowercase();

        let mut wildcard = GroupRules::default();
        let mut specific = GroupRules::default();

        // Agents named by the group currently being parsed. Multiple
        // consecutive User-agent lines form one group.
        let mut current_agents: Vec<String> = Vec::new();
        let mut in_group_body = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before.trim(),
                None => line.trim(),
            };
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_group_body {
                        current_agents.clear();
                        in_group_body = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "allow" | "disallow" | "crawl-delay" => {
                    in_group_body = true;

                    let for_wildcard = current_agents.iter().any(|a| a == "*");
                    let for_us = current_agents
                        .iter()
                        .any(|a| a != "*" && normalized_agent.contains(a.as_str()));

                    for group in [
                        for_wildcard.then_some(&mut wildcard),
                        for_us.then_some(&mut specific),
                    ]
                    .into_iter()
                    .flatten()
                    {
                        match key.as_str() {
                            "allow" if !value.is_empty() => group.allow.push(value.to_string()),
                            "disallow" if !value.is_empty() => {
                                group.disallow.push(value.to_string())
                            }
                            "crawl-delay" => {
                                if let Ok(seconds) = value.parse::<f64>() {
                                    group.crawl_delay = Some(Duration::from_secs_f64(seconds));
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        let group = if specific.has_rules() { specific } else { wildcard };

        Self {
            crawl_delay: group.crawl_delay.unwrap_or(DEFAULT_CRAWL_DELAY),
            allow: group.allow,
            disallow: group.disallow,
        }
    }

    /// Checks whether a URL path is allowed.
    ///
    /// The longest matching rule decides; Allow wins when an allow and a
    /// disallow rule match with equal specificity.
    pub fn is_allowed(&self, path: &str) -> bool {
        let disallow_len = longest_match(&self.disallow, path);
        let Some(disallow_len) = disallow_len else {
            return true;
        };

        match longest_match(&self.allow, path) {
            Some(allow_len) => allow_len >= disallow_len,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct GroupRules {
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<Duration>,
}

impl GroupRules {
    fn has_rules(&self) -> bool {
        !self.allow.is_empty() || !self.disallow.is_empty() || self.crawl_delay.is_some()
    }
}

/// Length of the longest rule prefix matching the path, if any
fn longest_match(rules: &[String], path: &str) -> Option<usize> {
    rules
        .iter()
        .filter(|rule| path.starts_with(rule.as_str()))
        .map(|rule| rule.len())
        .max()
}
