//! Read access to the knowledge store.
//!
//! [`Store`] borrows one pooled handle for the duration of a unit of work.
//! Knowledge rows are owned by external writers; apart from the audit table
//! nothing here mutates the store.

pub mod pool;
pub mod schema;
pub mod types;

pub use pool::{ConnectionPool, PoolStats};
pub use types::*;

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, ToSql, params};

use crate::error::Result;

/// Cap on candidate rows considered by the similarity matcher.
pub const SIMILARITY_CANDIDATES: usize = 100;

/// Escape SQL `LIKE` metacharacters so user text matches literally.
/// Use with `ESCAPE '\'`.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

const HEURISTIC_COLUMNS: &str = "id, domain, rule, explanation, source_type, confidence,
     times_validated, times_violated, is_golden, status, created_at, updated_at";

const LEARNING_COLUMNS: &str =
    "id, type, filepath, title, summary, tags, domain, severity, created_at";

const DECISION_COLUMNS: &str = "id, title, context, options_considered, decision, rationale,
     domain, status, superseded_by, created_at";

const INVARIANT_COLUMNS: &str =
    "id, statement, rationale, domain, scope, severity, status, violation_count, created_at";

const ASSUMPTION_COLUMNS: &str = "id, assumption, context, source, confidence, status, domain,
     verified_count, challenged_count, created_at";

const SPIKE_COLUMNS: &str = "id, title, topic, question, findings, gotchas,
     time_invested_minutes, domain, tags, usefulness_score, access_count, created_at";

/// Store view over one borrowed handle.
pub struct Store<'c> {
    conn: &'c Connection,
}

impl<'c> Store<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Heuristics & Learnings
    // ─────────────────────────────────────────────────────────────────────────

    /// Heuristics for a domain, highest confidence first.
    pub fn heuristics_by_domain(&self, domain: &str, limit: usize) -> Result<Vec<Heuristic>> {
        let sql = format!(
            "SELECT {HEURISTIC_COLUMNS} FROM heuristics
             WHERE domain = ?1
             ORDER BY confidence DESC, times_validated DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![domain, limit as i64], map_heuristic)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Learnings for a domain, newest first.
    pub fn learnings_by_domain(&self, domain: &str, limit: usize) -> Result<Vec<Learning>> {
        let sql = format!(
            "SELECT {LEARNING_COLUMNS} FROM learnings
             WHERE domain = ?1
             ORDER BY datetime(created_at) DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![domain, limit as i64], map_learning)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Learnings whose tag field contains any of `tags` literally.
    pub fn learnings_by_tags(&self, tags: &[String], limit: usize) -> Result<Vec<Learning>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let conditions = (1..=tags.len())
            .map(|i| format!("tags LIKE ?{i} ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT {LEARNING_COLUMNS} FROM learnings
             WHERE {conditions}
             ORDER BY datetime(created_at) DESC
             LIMIT ?{}",
            tags.len() + 1
        );

        let mut params_vec: Vec<Box<dyn ToSql>> = tags
            .iter()
            .map(|t| Box::new(format!("%{}%", escape_like(t))) as Box<dyn ToSql>)
            .collect();
        params_vec.push(Box::new(limit as i64));
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), map_learning)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Learnings created within the trailing window, newest first.
    pub fn recent_learnings(
        &self,
        days: u32,
        learning_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Learning>> {
        let sql = format!(
            "SELECT {LEARNING_COLUMNS} FROM learnings
             WHERE datetime(created_at) >= datetime('now', ?1)
               AND (?2 IS NULL OR type = ?2)
             ORDER BY datetime(created_at) DESC
             LIMIT ?3"
        );
        let window = format!("-{} days", days);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![window, learning_type, limit as i64], map_learning)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Most recent failures regardless of age.
    pub fn recent_failures(&self, limit: usize) -> Result<Vec<Learning>> {
        let sql = format!(
            "SELECT {LEARNING_COLUMNS} FROM learnings
             WHERE type = 'failure'
             ORDER BY datetime(created_at) DESC
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], map_learning)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Experiments & Reviews
    // ─────────────────────────────────────────────────────────────────────────

    pub fn active_experiments(&self, limit: usize) -> Result<Vec<Experiment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, hypothesis, status, cycles_run, folder_path, created_at, updated_at
             FROM experiments
             WHERE status = 'active'
             ORDER BY datetime(updated_at) DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], map_experiment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Pending reviews, oldest first so nothing starves.
    pub fn pending_reviews(&self, limit: usize) -> Result<Vec<PendingReview>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, context, recommendation, status, created_at
             FROM ceo_reviews
             WHERE status = 'pending'
             ORDER BY datetime(created_at) ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], map_review)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decisions, Invariants, Assumptions, Spikes
    //
    // A domain filter also admits rows with no domain.
    // ─────────────────────────────────────────────────────────────────────────

    pub fn accepted_decisions(&self, domain: Option<&str>, limit: usize) -> Result<Vec<Decision>> {
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions
             WHERE status = 'accepted'
               AND (?1 IS NULL OR domain = ?1 OR domain IS NULL)
             ORDER BY datetime(created_at) DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![domain, limit as i64], map_decision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn decision(&self, id: i64) -> Result<Option<Decision>> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![id], map_decision).optional()?)
    }

    /// Active and violated invariants, violated first.
    pub fn invariants(&self, domain: Option<&str>, limit: usize) -> Result<Vec<Invariant>> {
        let sql = format!(
            "SELECT {INVARIANT_COLUMNS} FROM invariants
             WHERE status IN ('active', 'violated')
               AND (?1 IS NULL OR domain = ?1 OR domain IS NULL)
             ORDER BY CASE status WHEN 'violated' THEN 0 ELSE 1 END,
                      violation_count DESC, datetime(created_at) DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![domain, limit as i64], map_invariant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Active or verified assumptions at or above `min_confidence`.
    pub fn trusted_assumptions(
        &self,
        domain: Option<&str>,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<Assumption>> {
        let sql = format!(
            "SELECT {ASSUMPTION_COLUMNS} FROM assumptions
             WHERE status IN ('active', 'verified')
               AND confidence >= ?2
               AND (?1 IS NULL OR domain = ?1 OR domain IS NULL)
             ORDER BY confidence DESC, datetime(created_at) DESC
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![domain, min_confidence, limit as i64], map_assumption)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Challenged or invalidated assumptions, most recently changed first.
    pub fn disputed_assumptions(
        &self,
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Assumption>> {
        let sql = format!(
            "SELECT {ASSUMPTION_COLUMNS} FROM assumptions
             WHERE status IN ('challenged', 'invalidated')
               AND (?1 IS NULL OR domain = ?1 OR domain IS NULL)
             ORDER BY datetime(updated_at) DESC, datetime(created_at) DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![domain, limit as i64], map_assumption)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Assumptions of any status, filtered by an optional status.
    pub fn assumptions(
        &self,
        domain: Option<&str>,
        status: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Assumption>> {
        let sql = format!(
            "SELECT {ASSUMPTION_COLUMNS} FROM assumptions
             WHERE (?1 IS NULL OR domain = ?1 OR domain IS NULL)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY confidence DESC, datetime(created_at) DESC
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![domain, status, limit as i64], map_assumption)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Spike reports, most useful first.
    pub fn spike_reports(&self, domain: Option<&str>, limit: usize) -> Result<Vec<SpikeReport>> {
        let sql = format!(
            "SELECT {SPIKE_COLUMNS} FROM spike_reports
             WHERE (?1 IS NULL OR domain = ?1 OR domain IS NULL)
             ORDER BY usefulness_score DESC, datetime(created_at) DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![domain, limit as i64], map_spike)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Violations
    // ─────────────────────────────────────────────────────────────────────────

    pub fn violations(&self, days: u32, acknowledged: Option<bool>) -> Result<Vec<Violation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, rule_id, rule_name, violation_date, description, session_id, acknowledged
             FROM violations
             WHERE datetime(violation_date) >= datetime('now', ?1)
               AND (?2 IS NULL OR acknowledged = ?2)
             ORDER BY datetime(violation_date) DESC",
        )?;
        let window = format!("-{} days", days);
        let rows = stmt
            .query_map(params![window, acknowledged], map_violation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn violation_summary(&self, days: u32) -> Result<ViolationSummary> {
        let window = format!("-{} days", days);

        let (total, acknowledged): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN acknowledged THEN 1 ELSE 0 END), 0)
             FROM violations
             WHERE datetime(violation_date) >= datetime('now', ?1)",
            params![window],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT rule_id, rule_name, COUNT(*) AS n
             FROM violations
             WHERE datetime(violation_date) >= datetime('now', ?1)
             GROUP BY rule_id, rule_name
             ORDER BY n DESC, rule_id ASC",
        )?;
        let by_rule = stmt
            .query_map(params![window], |row| {
                Ok(RuleViolationCount {
                    rule_id: row.get(0)?,
                    rule_name: row.get(1)?,
                    count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut recent = self.violations(days, None)?;
        recent.truncate(5);

        Ok(ViolationSummary {
            total,
            acknowledged,
            unacknowledged: total - acknowledged,
            by_rule,
            recent,
            days,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statistics
    // ─────────────────────────────────────────────────────────────────────────

    pub fn statistics(&self) -> Result<Statistics> {
        let mut stats = Statistics {
            learnings_by_type: self.grouped("SELECT type, COUNT(*) FROM learnings GROUP BY type")?,
            learnings_by_domain: self.grouped(
                "SELECT COALESCE(domain, ''), COUNT(*) FROM learnings GROUP BY domain",
            )?,
            heuristics_by_domain: self
                .grouped("SELECT domain, COUNT(*) FROM heuristics GROUP BY domain")?,
            experiments_by_status: self.grouped(
                "SELECT COALESCE(status, ''), COUNT(*) FROM experiments GROUP BY status",
            )?,
            ceo_reviews_by_status: self.grouped(
                "SELECT COALESCE(status, ''), COUNT(*) FROM ceo_reviews GROUP BY status",
            )?,
            assumptions_by_status: self.grouped(
                "SELECT COALESCE(status, ''), COUNT(*) FROM assumptions GROUP BY status",
            )?,
            violations_by_rule_7d: self.grouped(
                "SELECT rule_name, COUNT(*) FROM violations
                 WHERE datetime(violation_date) >= datetime('now', '-7 days')
                 GROUP BY rule_name",
            )?,
            ..Default::default()
        };

        stats.golden_heuristics = self.scalar("SELECT COUNT(*) FROM heuristics WHERE is_golden = 1")?;
        stats.total_learnings = self.scalar("SELECT COUNT(*) FROM learnings")?;
        stats.total_heuristics = self.scalar("SELECT COUNT(*) FROM heuristics")?;
        stats.total_experiments = self.scalar("SELECT COUNT(*) FROM experiments")?;
        stats.total_ceo_reviews = self.scalar("SELECT COUNT(*) FROM ceo_reviews")?;
        stats.accepted_decisions =
            self.scalar("SELECT COUNT(*) FROM decisions WHERE status = 'accepted'")?;
        stats.superseded_decisions =
            self.scalar("SELECT COUNT(*) FROM decisions WHERE status = 'superseded'")?;
        stats.active_invariants =
            self.scalar("SELECT COUNT(*) FROM invariants WHERE status = 'active'")?;
        stats.violated_invariants =
            self.scalar("SELECT COUNT(*) FROM invariants WHERE status = 'violated'")?;
        stats.total_invariant_violations =
            self.scalar("SELECT COALESCE(SUM(violation_count), 0) FROM invariants")?;
        stats.total_spike_reports = self.scalar("SELECT COUNT(*) FROM spike_reports")?;
        stats.total_spike_time_invested =
            self.scalar("SELECT COALESCE(SUM(time_invested_minutes), 0) FROM spike_reports")?;
        stats.avg_spike_usefulness = self.conn.query_row(
            "SELECT COALESCE(AVG(usefulness_score), 0.0) FROM spike_reports
             WHERE usefulness_score > 0",
            [],
            |row| row.get(0),
        )?;
        stats.queries_24h = self.scalar(
            "SELECT COUNT(*) FROM building_queries
             WHERE datetime(created_at) >= datetime('now', '-1 day')",
        )?;
        stats.violations_7d = self.scalar(
            "SELECT COUNT(*) FROM violations
             WHERE datetime(violation_date) >= datetime('now', '-7 days')",
        )?;

        Ok(stats)
    }

    fn scalar(&self, sql: &str) -> Result<i64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    fn grouped(&self, sql: &str) -> Result<BTreeMap<String, i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(pairs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row Mapping
// ─────────────────────────────────────────────────────────────────────────────

fn map_heuristic(row: &rusqlite::Row) -> rusqlite::Result<Heuristic> {
    Ok(Heuristic {
        id: row.get(0)?,
        domain: row.get(1)?,
        rule: row.get(2)?,
        explanation: row.get(3)?,
        source_type: row.get(4)?,
        confidence: clamp_score(row.get::<_, Option<f64>>(5)?.unwrap_or(0.5), 0.0, 1.0),
        times_validated: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        times_violated: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        is_golden: row.get::<_, Option<bool>>(8)?.unwrap_or(false),
        status: row.get::<_, Option<String>>(9)?.unwrap_or_else(|| "active".into()),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_learning(row: &rusqlite::Row) -> rusqlite::Result<Learning> {
    Ok(Learning {
        id: row.get(0)?,
        learning_type: row.get(1)?,
        filepath: row.get(2)?,
        title: row.get(3)?,
        summary: row.get(4)?,
        tags: row.get(5)?,
        domain: row.get(6)?,
        severity: row.get::<_, Option<i64>>(7)?.unwrap_or(1),
        created_at: row.get(8)?,
    })
}

fn map_experiment(row: &rusqlite::Row) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        id: row.get(0)?,
        name: row.get(1)?,
        hypothesis: row.get(2)?,
        status: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        cycles_run: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        folder_path: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_review(row: &rusqlite::Row) -> rusqlite::Result<PendingReview> {
    Ok(PendingReview {
        id: row.get(0)?,
        title: row.get(1)?,
        context: row.get(2)?,
        recommendation: row.get(3)?,
        status: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        created_at: row.get(5)?,
    })
}

fn map_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
    Ok(Decision {
        id: row.get(0)?,
        title: row.get(1)?,
        context: row.get(2)?,
        options_considered: row.get(3)?,
        decision: row.get(4)?,
        rationale: row.get(5)?,
        domain: row.get(6)?,
        status: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        superseded_by: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn map_invariant(row: &rusqlite::Row) -> rusqlite::Result<Invariant> {
    Ok(Invariant {
        id: row.get(0)?,
        statement: row.get(1)?,
        rationale: row.get(2)?,
        domain: row.get(3)?,
        scope: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "codebase".into()),
        severity: row.get::<_, Option<String>>(5)?.unwrap_or_else(|| "error".into()),
        status: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        violation_count: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        created_at: row.get(8)?,
    })
}

fn map_assumption(row: &rusqlite::Row) -> rusqlite::Result<Assumption> {
    Ok(Assumption {
        id: row.get(0)?,
        assumption: row.get(1)?,
        context: row.get(2)?,
        source: row.get(3)?,
        confidence: clamp_score(row.get::<_, Option<f64>>(4)?.unwrap_or(0.5), 0.0, 1.0),
        status: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        domain: row.get(6)?,
        verified_count: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        challenged_count: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        created_at: row.get(9)?,
    })
}

fn map_spike(row: &rusqlite::Row) -> rusqlite::Result<SpikeReport> {
    Ok(SpikeReport {
        id: row.get(0)?,
        title: row.get(1)?,
        topic: row.get(2)?,
        question: row.get(3)?,
        findings: row.get(4)?,
        gotchas: row.get(5)?,
        time_invested_minutes: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        domain: row.get(7)?,
        tags: row.get(8)?,
        usefulness_score: clamp_score(row.get::<_, Option<f64>>(9)?.unwrap_or(0.0), 0.0, 5.0),
        access_count: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        created_at: row.get(11)?,
    })
}

fn map_violation(row: &rusqlite::Row) -> rusqlite::Result<Violation> {
    Ok(Violation {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        rule_name: row.get(2)?,
        violation_date: row.get(3)?,
        description: row.get(4)?,
        session_id: row.get(5)?,
        acknowledged: row.get::<_, Option<bool>>(6)?.unwrap_or(false),
    })
}
