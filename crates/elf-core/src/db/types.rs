//! Database types for elf-core.
//!
//! Rows are written by external collaborators (recording hooks, the
//! dashboard); the engine only reads them. Timestamps are kept as the text
//! the writer stored and parsed on demand.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge Items
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heuristic {
    pub id: i64,
    pub domain: String,
    pub rule: String,
    pub explanation: Option<String>,
    pub source_type: Option<String>,
    pub confidence: f64,
    pub times_validated: i64,
    pub times_violated: i64,
    pub is_golden: bool,
    pub status: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub id: i64,
    #[serde(rename = "type")]
    pub learning_type: String,
    pub filepath: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub tags: Option<String>,
    pub domain: Option<String>,
    pub severity: i64,
    pub created_at: Option<String>,
}

impl Learning {
    pub fn is_failure(&self) -> bool {
        self.learning_type == "failure"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub title: String,
    pub context: Option<String>,
    pub options_considered: Option<String>,
    pub decision: String,
    pub rationale: Option<String>,
    pub domain: Option<String>,
    pub status: String,
    pub superseded_by: Option<i64>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    pub id: i64,
    pub statement: String,
    pub rationale: Option<String>,
    pub domain: Option<String>,
    pub scope: String,
    pub severity: String,
    pub status: String,
    pub violation_count: i64,
    pub created_at: Option<String>,
}

impl Invariant {
    pub fn is_violated(&self) -> bool {
        self.status == "violated"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub id: i64,
    pub assumption: String,
    pub context: Option<String>,
    pub source: Option<String>,
    pub confidence: f64,
    pub status: String,
    pub domain: Option<String>,
    pub verified_count: i64,
    pub challenged_count: i64,
    pub created_at: Option<String>,
}

impl Assumption {
    /// Challenged or invalidated assumptions are surfaced as warnings.
    pub fn is_disputed(&self) -> bool {
        self.status == "challenged" || self.status == "invalidated"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeReport {
    pub id: i64,
    pub title: String,
    pub topic: Option<String>,
    pub question: Option<String>,
    pub findings: Option<String>,
    pub gotchas: Option<String>,
    pub time_invested_minutes: i64,
    pub domain: Option<String>,
    pub tags: Option<String>,
    pub usefulness_score: f64,
    pub access_count: i64,
    pub created_at: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflow Items
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub name: String,
    pub hypothesis: Option<String>,
    pub status: String,
    pub cycles_run: i64,
    pub folder_path: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// An escalated item awaiting human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub id: i64,
    pub title: String,
    pub context: Option<String>,
    pub recommendation: Option<String>,
    pub status: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: i64,
    pub rule_id: i64,
    pub rule_name: String,
    pub violation_date: Option<String>,
    pub description: Option<String>,
    pub session_id: Option<String>,
    pub acknowledged: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Query Results
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainCounts {
    pub heuristics: usize,
    pub learnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain: String,
    pub heuristics: Vec<Heuristic>,
    pub learnings: Vec<Learning>,
    pub count: DomainCounts,
}

/// A past failure whose wording overlaps the current task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarFailure {
    pub learning: Learning,
    pub similarity: f64,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolationCount {
    pub rule_id: i64,
    pub rule_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: i64,
    pub acknowledged: i64,
    pub unacknowledged: i64,
    pub by_rule: Vec<RuleViolationCount>,
    pub recent: Vec<Violation>,
    pub days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub learnings_by_type: BTreeMap<String, i64>,
    pub learnings_by_domain: BTreeMap<String, i64>,
    pub heuristics_by_domain: BTreeMap<String, i64>,
    pub golden_heuristics: i64,
    pub experiments_by_status: BTreeMap<String, i64>,
    pub ceo_reviews_by_status: BTreeMap<String, i64>,
    pub assumptions_by_status: BTreeMap<String, i64>,
    pub total_learnings: i64,
    pub total_heuristics: i64,
    pub total_experiments: i64,
    pub total_ceo_reviews: i64,
    pub accepted_decisions: i64,
    pub superseded_decisions: i64,
    pub active_invariants: i64,
    pub violated_invariants: i64,
    pub total_invariant_violations: i64,
    pub total_spike_reports: i64,
    pub avg_spike_usefulness: f64,
    pub total_spike_time_invested: i64,
    pub queries_24h: i64,
    pub violations_7d: i64,
    pub violations_by_rule_7d: BTreeMap<String, i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Integrity
// ─────────────────────────────────────────────────────────────────────────────

/// Structured outcome of a store consistency check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub integrity: Option<String>,
    pub foreign_key_violations: usize,
    pub tables: Vec<String>,
    pub indexes: Vec<String>,
    pub row_counts: BTreeMap<String, i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a stored timestamp. Accepts SQLite `CURRENT_TIMESTAMP` text and
/// ISO-8601 with optional fractional seconds or offset; naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Clamp a value into `[min, max]`, mapping NaN to `min`.
pub fn clamp_score(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_timestamp_formats() {
        let sqlite = parse_timestamp("2025-03-04 10:11:12").unwrap();
        assert_eq!(sqlite.day(), 4);
        assert_eq!(sqlite.hour(), 10);

        let iso = parse_timestamp("2025-03-04T10:11:12.345678").unwrap();
        assert_eq!(iso.second(), 12);

        let offset = parse_timestamp("2025-03-04T10:11:12+02:00").unwrap();
        assert_eq!(offset.hour(), 8);

        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(1.7, 0.0, 1.0), 1.0);
        assert_eq!(clamp_score(-0.2, 0.0, 1.0), 0.0);
        assert_eq!(clamp_score(f64::NAN, 0.0, 1.0), 0.0);
        assert_eq!(clamp_score(3.5, 0.0, 5.0), 3.5);
    }

    #[test]
    fn test_learning_serializes_type_field() {
        let learning = Learning {
            id: 1,
            learning_type: "failure".into(),
            filepath: None,
            title: "t".into(),
            summary: None,
            tags: None,
            domain: None,
            severity: 1,
            created_at: None,
        };
        let json = serde_json::to_value(&learning).unwrap();
        assert_eq!(json["type"], "failure");
        assert!(learning.is_failure());
    }
}
