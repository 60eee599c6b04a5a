use crate::UrlError;
use url::Url;

/// Tracking query parameters stripped during canonicalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "xtor",
    "ref",
    "source",
];

/// Canonicalizes an article URL.
///
/// The canonical form is the unique key for exact dedup, so two URLs that
/// address the same article must canonicalize identically:
///
/// 1. Parse; reject non-HTTP(S) schemes
/// 2. Lowercase the host, strip a leading `www.`
/// 3. Collapse dot segments, drop the trailing slash (except root)
/// 4. Drop the fragment
/// 5. Drop tracking query parameters, sort the rest alphabetically
///
/// # Examples
///
/// ```
/// use veilleur::canonicalize_url;
///
/// let url = canonicalize_url("https://WWW.Example.COM/news/story/?utm_source=x").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/news/story");
/// ```
pub fn canonicalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) => {
            let mut canonical_host = host.to_lowercase();
            if let Some(stripped) = canonical_host.strip_prefix("www.") {
                canonical_host = stripped.to_string();
            }
            url.set_host(Some(&canonical_host))
                .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
        }
        None => return Err(UrlError::MissingDomain),
    }

    let canonical_path = canonicalize_path(url.path());
    url.set_path(&canonical_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));

        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Collapses dot segments and strips the trailing slash (except for root)
fn canonicalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_host() {
        let result = canonicalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_strips_www() {
        let result = canonicalize_url("https://www.example.com/news").unwrap();
        assert_eq!(result.as_str(), "https://example.com/news");
    }

    #[test]
    fn test_strips_trailing_slash() {
        let result = canonicalize_url("https://example.com/news/story/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/news/story");
    }

    #[test]
    fn test_root_keeps_slash() {
        let result = canonicalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_strips_fragment() {
        let result = canonicalize_url("https://example.com/story#comments").unwrap();
        assert_eq!(result.as_str(), "https://example.com/story");
    }

    #[test]
    fn test_strips_tracking_params() {
        let result =
            canonicalize_url("https://example.com/story?utm_source=tw&utm_medium=social").unwrap();
        assert_eq!(result.as_str(), "https://example.com/story");
    }

    #[test]
    fn test_sorts_remaining_params() {
        let result = canonicalize_url("https://example.com/story?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/story?a=1&b=2");
    }

    #[test]
    fn test_mixed_tracking_and_real_params() {
        let result = canonicalize_url("https://example.com/story?page=2&fbclid=abc").unwrap();
        assert_eq!(result.as_str(), "https://example.com/story?page=2");
    }

    #[test]
    fn test_collapses_dot_segments() {
        let result = canonicalize_url("https://example.com/a/b/../c/./d").unwrap();
        assert_eq!(result.as_str(), "https://example.com/a/c/d");
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(canonicalize_url("ftp://example.com/file").is_err());
        assert!(canonicalize_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_same_article_same_canonical_form() {
        let a = canonicalize_url("http://www.example.com/news/story/?utm_campaign=x#top");
        let b = canonicalize_url("http://example.com/news/story");
        assert_eq!(a.unwrap().as_str(), b.unwrap().as_str());
    }
}
