//! Article extraction
//!
//! Extraction is a collaborator boundary: the orchestrator only sees the
//! [`Extract`] trait and treats `None` as "not an article". The default
//! implementation is deliberately lightweight — JSON-LD `NewsArticle`
//! blocks, OpenGraph/meta tags, `<html lang>`, and a paragraph-text
//! fallback for the summary. No general-purpose readability engine.

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

/// Structured data extracted from one article page
#[derive(Debug, Clone)]
pub struct Extracted {
    pub title: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub lang: Option<String>,
    pub paywalled: bool,
}

/// Extraction collaborator interface
pub trait Extract: Send + Sync {
    /// Extracts article data from a fetched page. `None` means the page
    /// is not an article (or not extractable), which the caller counts
    /// as a quality skip.
    fn extract(&self, url: &Url, html: &str) -> Option<Extracted>;
}

/// Default meta-tag/JSON-LD extractor
pub struct MetaExtractor;

impl Extract for MetaExtractor {
    fn extract(&self, url: &Url, html: &str) -> Option<Extracted> {
        let document = Html::parse_document(html);

        let jsonld = find_jsonld_article(&document);

        let title = jsonld
            .as_ref()
            .and_then(|a| a.get("headline"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| meta_content(&document, "meta[property=\"og:title\"]"))
            .or_else(|| tag_text(&document, "title"))?;

        let summary = jsonld
            .as_ref()
            .and_then(|a| a.get("articleBody"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| paragraph_text(&document))
            .or_else(|| meta_content(&document, "meta[property=\"og:description\"]"))?;

        let published_at = jsonld
            .as_ref()
            .and_then(|a| a.get("datePublished"))
            .and_then(Value::as_str)
            .and_then(parse_date)
            .or_else(|| {
                meta_content(&document, "meta[property=\"article:published_time\"]")
                    .as_deref()
                    .and_then(parse_date)
            });

        let image_url = jsonld
            .as_ref()
            .and_then(|a| a.get("image"))
            .and_then(image_from_jsonld)
            .or_else(|| meta_content(&document, "meta[property=\"og:image\"]"))
            .and_then(|raw| url.join(&raw).ok())
            .map(|u| u.to_string());

        let lang = html_lang(&document);

        let paywalled = jsonld
            .as_ref()
            .and_then(|a| a.get("isAccessibleForFree"))
            .map(is_false_ish)
            .unwrap_or(false);

        let title = title.trim().to_string();
        let summary = summary.trim().to_string();
        if title.is_empty() || summary.is_empty() {
            return None;
        }

        Some(Extracted {
            title,
            summary,
            published_at,
            image_url,
            lang,
            paywalled,
        })
    }
}

/// True when the page carries a JSON-LD news-article block. Used by the
/// discovery probe as a strong signal the domain publishes news.
pub fn has_news_jsonld(html: &str) -> bool {
    find_jsonld_article(&Html::parse_document(html)).is_some()
}

/// Declared `<html lang>` language code of a page, primary subtag only
pub fn page_lang(html: &str) -> Option<String> {
    html_lang(&Html::parse_document(html))
}

/// Finds the first JSON-LD object typed as a news article, looking inside
/// top-level arrays and `@graph` containers.
fn find_jsonld_article(document: &Html) -> Option<Value> {
    let selector = Selector::parse("script[type=\"application/ld+json\"]").ok()?;

    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };

        if let Some(article) = find_article_value(&value) {
            return Some(article.clone());
        }
    }
    None
}

fn find_article_value(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if map
                .get("@type")
                .map(|t| type_matches(t, &["NewsArticle", "Article", "ReportageNewsArticle"]))
                .unwrap_or(false)
            {
                return Some(value);
            }
            map.get("@graph").and_then(find_article_value)
        }
        Value::Array(items) => items.iter().find_map(find_article_value),
        _ => None,
    }
}

fn type_matches(type_value: &Value, wanted: &[&str]) -> bool {
    match type_value {
        Value::String(s) => wanted.contains(&s.as_str()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| wanted.contains(&s)),
        _ => false,
    }
}

fn image_from_jsonld(image: &Value) -> Option<String> {
    match image {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(image_from_jsonld),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn is_false_ish(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::String(s) => s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn tag_text(document: &Html, tag: &str) -> Option<String> {
    let selector = Selector::parse(tag).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Readability fallback: concatenated `<p>` text from the page body
fn paragraph_text(document: &Html) -> Option<String> {
    let selector = Selector::parse("article p, main p, p").ok()?;

    let text = document
        .select(&selector)
        .map(|p| p.text().collect::<String>())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn html_lang(document: &Html) -> Option<String> {
    let selector = Selector::parse("html").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|lang| lang.split('-').next().unwrap_or(lang).to_lowercase())
        .filter(|lang| !lang.is_empty())
}

/// Accepts RFC 3339 first, then a couple of common sloppy date formats
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
        return Some(date.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
