//! Polite HTTP fetcher
//!
//! This module handles all outbound HTTP for the crawler:
//! - Building the HTTP client with a proper user agent string
//! - Bounded retries with exponential backoff and jitter
//! - Honoring `Retry-After` on backoff
//! - Surfacing 304/429/403/5xx distinctly to callers

use crate::config::UserAgentConfig;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Base delay for exponential backoff
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Backoff is never longer than this, `Retry-After` included
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Upper bound for jitter added to every backoff
const JITTER_MAX_MS: u64 = 300;

/// Options for a single fetch call
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-attempt timeout
    pub timeout: Duration,

    /// Retry budget for transient failures (5xx, network, timeout)
    pub max_retries: u32,

    /// Extra request headers (name, value)
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            headers: Vec::new(),
        }
    }
}

/// Response from a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,

    /// Response body (empty for 304)
    pub body: String,

    /// True when the server answered 304 Not Modified
    pub not_modified: bool,

    /// ETag header, if present
    pub etag: Option<String>,

    /// Last-Modified header, if present
    pub last_modified: Option<String>,
}

/// Fetch failures, classified for the orchestrator's error taxonomy
#[derive(Debug, Error)]
pub enum FetchError {
    /// 429 or 403: the domain is pushing back. Never retried in-run;
    /// the orchestrator sets a domain cooldown instead.
    #[error("Rate limited ({status}) fetching {url}")]
    RateLimited {
        url: String,
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Timeout, connection failure, or 5xx after the retry budget
    #[error("Transient fetch failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// Non-retriable HTTP error (4xx other than 429/403)
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Builds the shared HTTP client.
///
/// User agent format: `CrawlerName/Version (+ContactURL; ContactEmail)`.
/// Timeouts are applied per request, since article fetches and discovery
/// probes use different budgets.
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL with bounded retries.
///
/// Transient failures (timeout, network, 5xx) are retried up to
/// `opts.max_retries` times with exponential backoff capped at 30s plus
/// 0-300ms jitter; an explicit `Retry-After` overrides the computed
/// backoff for that attempt. 429/403 and other 4xx are returned
/// immediately without retrying.
pub async fn fetch(
    client: &Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchResponse, FetchError> {
    let mut attempt: u32 = 0;

    loop {
        let mut request = client.get(url).timeout(opts.timeout);
        for (name, value) in &opts.headers {
            request = request.header(name, value);
        }

        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status == StatusCode::NOT_MODIFIED {
                    return Ok(FetchResponse {
                        status: status.as_u16(),
                        body: String::new(),
                        not_modified: true,
                        etag: header_string(&response, "etag"),
                        last_modified: header_string(&response, "last-modified"),
                    });
                }

                if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
                    let retry_after = parse_retry_after(header_string(&response, "retry-after"));
                    return Err(FetchError::RateLimited {
                        url: url.to_string(),
                        status: status.as_u16(),
                        retry_after,
                    });
                }

                if status.is_server_error() {
                    let retry_after = parse_retry_after(header_string(&response, "retry-after"));
                    Err((format!("HTTP {}", status.as_u16()), retry_after))
                } else if !status.is_success() {
                    return Err(FetchError::Http {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                } else {
                    let etag = header_string(&response, "etag");
                    let last_modified = header_string(&response, "last-modified");
                    let status = status.as_u16();

                    match response.text().await {
                        Ok(body) => Ok(FetchResponse {
                            status,
                            body,
                            not_modified: false,
                            etag,
                            last_modified,
                        }),
                        Err(e) => Err((format!("body read failed: {}", e), None)),
                    }
                }
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    "request timeout".to_string()
                } else if e.is_connect() {
                    "connection failed".to_string()
                } else {
                    e.to_string()
                };
                Err((message, None))
            }
        };

        match outcome {
            Ok(response) => return Ok(response),
            Err((message, retry_after)) => {
                if attempt >= opts.max_retries {
                    return Err(FetchError::Transient {
                        url: url.to_string(),
                        message,
                    });
                }

                let delay = retry_after.unwrap_or_else(|| backoff_delay(attempt));
                tracing::debug!(
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient fetch failure ({}), retrying",
                    message
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Exponential backoff for the given attempt, capped, with jitter
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE
        .checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(BACKOFF_CAP)
        .min(BACKOFF_CAP);
    exp + jitter()
}

/// Uniform jitter in 0..300ms
pub(crate) fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MAX_MS))
}

/// Parses a `Retry-After` value: either delta-seconds or an HTTP-date.
/// The result is capped at the backoff ceiling.
fn parse_retry_after(value: Option<String>) -> Option<Duration> {
    let value = value?;
    let trimmed = value.trim();

    let delay = if let Ok(seconds) = trimmed.parse::<u64>() {
        Duration::from_secs(seconds)
    } else {
        let date = chrono::DateTime::parse_from_rfc2822(trimmed).ok()?;
        let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        Duration::from_secs(delta.num_seconds().max(0) as u64)
    };

    Some(delay.min(BACKOFF_CAP))
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
