use crate::store::ArticleRecord;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Step-function recency weights
const RECENCY_STEPS: &[(i64, f64)] = &[(3, 1.0), (12, 0.8), (48, 0.6)];
const RECENCY_FLOOR: f64 = 0.3;

/// Topical score saturates at this value during normalization
const TOPIC_SCORE_CEILING: f64 = 50.0;

const TOPIC_WEIGHT: f64 = 0.2;
const SOURCE_WEIGHT: f64 = 0.1;

/// One article with its ranking inputs
#[derive(Debug, Clone)]
pub struct RankEntry {
    pub article: ArticleRecord,
    pub topic_score: i64,
    pub source_points: i64,
}

/// Recency weight for a publish time: 1.0 within 3h, 0.8 within 12h,
/// 0.6 within 48h, 0.3 beyond
pub fn recency_weight(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = (now - published_at).num_hours();
    for (limit, weight) in RECENCY_STEPS {
        if age_hours <= *limit {
            return *weight;
        }
    }
    RECENCY_FLOOR
}

/// Composite score for one entry.
///
/// `points_range` is (min, max) reputation points across all sources;
/// None or a uniform pool normalizes to 0.5.
pub fn composite_score(
    entry: &RankEntry,
    points_range: Option<(i64, i64)>,
    now: DateTime<Utc>,
) -> f64 {
    let recency = recency_weight(entry.article.published_at, now);

    let normalized_topic = (entry.topic_score as f64 / TOPIC_SCORE_CEILING).min(1.0);

    let normalized_points = match points_range {
        Some((min, max)) if max > min => (entry.source_points - min) as f64 / (max - min) as f64,
        _ => 0.5,
    };

    recency + TOPIC_WEIGHT * normalized_topic + SOURCE_WEIGHT * normalized_points
}

/// Sorts entries into the feed order: composite score descending, then
/// non-paywalled before paywalled, then earlier publish time first. The
/// order is total and deterministic.
pub fn rank_articles(
    mut entries: Vec<RankEntry>,
    points_range: Option<(i64, i64)>,
    now: DateTime<Utc>,
) -> Vec<RankEntry> {
    entries.sort_by(|a, b| {
        let score_a = composite_score(a, points_range, now);
        let score_b = composite_score(b, points_range, now);

        score_b
            .partial_cmp(&score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.article.paywalled.cmp(&b.article.paywalled))
            .then_with(|| a.article.published_at.cmp(&b.article.published_at))
    });
    entries
}
