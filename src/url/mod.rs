//! URL handling module
//!
//! Canonicalization of article URLs and domain extraction. Canonical URLs
//! are the exact-dedup key for the whole pipeline, so every URL that
//! reaches the store goes through [`canonicalize_url`] first.

mod canonical;
mod domain;

pub use canonical::canonicalize_url;
pub use domain::extract_domain;

use crate::UrlError;
use url::Url;

/// Builds the origin URL for a bare source domain.
///
/// Sources are stored as bare domains and crawled over HTTPS; loopback
/// hosts (used by local test servers) get plain HTTP since they have no
/// certificates.
pub fn origin_for_domain(domain: &str) -> Result<Url, UrlError> {
    let scheme = if domain.starts_with("127.0.0.1") || domain.starts_with("localhost") {
        "http"
    } else {
        "https"
    };

    Url::parse(&format!("{}://{}/", scheme, domain)).map_err(|e| UrlError::Parse(e.to_string()))
}
