//! Relevance scoring.
//!
//! `score = 0.5 × (0.5 + 0.5 × 0.5^(age_days / 7)) × domain × validation`,
//! clamped to 1.0. The lowest reachable value is 0.25 (ancient, off-domain,
//! unvalidated); the function never touches the store.

pub mod similarity;

use chrono::{DateTime, Utc};

use crate::db::types::{parse_timestamp, Heuristic, Learning};

pub use similarity::{find_similar, jaccard, tokenize};

pub const BASE_SCORE: f64 = 0.5;
pub const HALF_LIFE_DAYS: f64 = 7.0;
pub const DOMAIN_BOOST: f64 = 1.5;
pub const HIGH_VALIDATION_BOOST: f64 = 1.4;
pub const MODERATE_VALIDATION_BOOST: f64 = 1.2;
pub const MIN_SCORE: f64 = 0.25;
pub const MAX_SCORE: f64 = 1.0;

/// Recency factor used when an item's timestamp is missing or unreadable.
const NEUTRAL_RECENCY: f64 = 0.5;

/// Anything the scorer can rank.
pub trait Scorable {
    fn domain(&self) -> Option<&str>;
    fn timestamp(&self) -> Option<&str>;
    fn validation_count(&self) -> i64 {
        0
    }
}

impl Scorable for Heuristic {
    fn domain(&self) -> Option<&str> {
        Some(&self.domain)
    }

    fn timestamp(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    fn validation_count(&self) -> i64 {
        self.times_validated
    }
}

impl Scorable for Learning {
    fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    fn timestamp(&self) -> Option<&str> {
        self.created_at.as_deref()
    }
}

/// Score an item as of `now`.
pub fn score_at<T: Scorable + ?Sized>(item: &T, domain: Option<&str>, now: DateTime<Utc>) -> f64 {
    let recency = item
        .timestamp()
        .and_then(parse_timestamp)
        .map(|created| recency_factor(created, now))
        .unwrap_or(NEUTRAL_RECENCY);

    let mut score = BASE_SCORE * (0.5 + 0.5 * recency);

    if domain.is_some() && domain == item.domain() {
        score *= DOMAIN_BOOST;
    }

    let validated = item.validation_count();
    if validated > 10 {
        score *= HIGH_VALIDATION_BOOST;
    } else if validated > 5 {
        score *= MODERATE_VALIDATION_BOOST;
    }

    score.min(MAX_SCORE)
}

/// `0.5^(age_days / 7)`; future timestamps count as age zero.
pub fn recency_factor(created: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created).num_seconds().max(0) as f64 / 86_400.0;
    0.5_f64.powf(age_days / HALF_LIFE_DAYS)
}

/// Sort items by descending score. Equal scores keep their input order.
pub fn rank<T: Scorable>(items: Vec<T>, domain: Option<&str>) -> Vec<T> {
    let now = Utc::now();
    let mut scored: Vec<(f64, T)> = items
        .into_iter()
        .map(|item| (score_at(&item, domain, now), item))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct Item {
        domain: Option<String>,
        created_at: Option<String>,
        validated: i64,
    }

    impl Scorable for Item {
        fn domain(&self) -> Option<&str> {
            self.domain.as_deref()
        }
        fn timestamp(&self) -> Option<&str> {
            self.created_at.as_deref()
        }
        fn validation_count(&self) -> i64 {
            self.validated
        }
    }

    fn item(domain: Option<&str>, age_days: i64, validated: i64, now: DateTime<Utc>) -> Item {
        Item {
            domain: domain.map(String::from),
            created_at: Some(
                (now - Duration::days(age_days))
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            ),
            validated,
        }
    }

    #[test]
    fn test_older_item_scores_strictly_lower() {
        let now = Utc::now();
        let fresh = item(Some("auth"), 1, 0, now);
        let stale = item(Some("auth"), 30, 0, now);
        assert!(score_at(&stale, Some("auth"), now) < score_at(&fresh, Some("auth"), now));
    }

    #[test]
    fn test_domain_match_raises_score() {
        let now = Utc::now();
        let it = item(Some("auth"), 3, 0, now);
        assert!(score_at(&it, Some("auth"), now) > score_at(&it, Some("db"), now));
        assert!(score_at(&it, Some("auth"), now) > score_at(&it, None, now));
    }

    #[test]
    fn test_validation_boosts_are_exclusive() {
        let now = Utc::now();
        let base = score_at(&item(None, 14, 0, now), None, now);
        let moderate = score_at(&item(None, 14, 6, now), None, now);
        let high = score_at(&item(None, 14, 11, now), None, now);

        assert!((moderate / base - 1.2).abs() < 1e-9);
        assert!((high / base - 1.4).abs() < 1e-9);
        assert_eq!(score_at(&item(None, 14, 5, now), None, now), base);
    }

    #[test]
    fn test_exact_values() {
        let now = Utc::now();
        // Age zero: 0.5 * 1.0
        assert!((score_at(&item(None, 0, 0, now), None, now) - 0.5).abs() < 1e-5);
        // One half-life: 0.5 * 0.75
        assert!((score_at(&item(None, 7, 0, now), None, now) - 0.375).abs() < 1e-5);
        // Fresh, on-domain, highly validated: 0.5 * 1.5 * 1.4 clamps to 1.0
        assert_eq!(score_at(&item(Some("a"), 0, 50, now), Some("a"), now), 1.0);
    }

    #[test]
    fn test_score_always_in_bounds() {
        let now = Utc::now();
        for age in [0, 1, 7, 30, 365, 10_000] {
            for validated in [0, 6, 11, 1000] {
                for domain in [None, Some("auth"), Some("other")] {
                    let it = item(Some("auth"), age, validated, now);
                    let s = score_at(&it, domain, now);
                    assert!((MIN_SCORE..=MAX_SCORE).contains(&s), "score {} out of range", s);
                }
            }
        }
    }

    #[test]
    fn test_unparsable_or_future_timestamps() {
        let now = Utc::now();
        let garbage = Item {
            domain: None,
            created_at: Some("not a date".into()),
            validated: 0,
        };
        assert!((score_at(&garbage, None, now) - 0.375).abs() < 1e-9);

        let future = item(None, -5, 0, now);
        assert!((score_at(&future, None, now) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rank_orders_by_score() {
        let now = Utc::now();
        let oldest = item(None, 60, 0, now);
        let oldest_created = oldest.created_at.clone();
        let ranked = rank(
            vec![oldest, item(Some("auth"), 1, 0, now), item(None, 1, 0, now)],
            Some("auth"),
        );
        assert_eq!(ranked[0].domain.as_deref(), Some("auth"));
        assert_eq!(ranked[2].created_at, oldest_created);
    }
}
