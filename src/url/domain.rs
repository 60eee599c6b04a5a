use url::Url;

/// Extracts the lowercase authority (host, plus port when explicit) from
/// a URL.
///
/// Domains key every per-domain structure in the crawler (rate buckets,
/// robots cache, cooldowns, source lookup), so extraction is centralized
/// here. The port is part of the key: a site on a nonstandard port is a
/// different origin with its own robots.txt and its own pacing.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use veilleur::extract_domain;
///
/// let url = Url::parse("https://News.Example.com/story").unwrap();
/// assert_eq!(extract_domain(&url), Some("news.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|host| match url.port() {
        Some(port) => format!("{}:{}", host.to_lowercase(), port),
        None => host.to_lowercase(),
    })
}
