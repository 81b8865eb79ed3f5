//! Query audit trail.
//!
//! After every public call the engine hands one [`AuditRecord`] to an
//! [`AuditSink`]. Whatever the sink does (fail, panic) is absorbed by the
//! engine; the caller's result is already fixed by then.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;
use serde::Serialize;

use crate::db::ConnectionPool;
use crate::db::pool::BUSY_TIMEOUT;
use crate::db::types::{
    Assumption, Decision, DomainResult, Experiment, IntegrityReport, Invariant, Learning,
    PendingReview, SimilarFailure, SpikeReport, Statistics, Violation, ViolationSummary,
};
use crate::error::{Error, Result};

/// One row of the `building_queries` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditRecord {
    pub query_type: String,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub domain: Option<String>,
    pub tags: Option<String>,
    pub limit_requested: Option<i64>,
    pub max_tokens_requested: Option<i64>,
    pub results_returned: i64,
    pub tokens_approximated: Option<i64>,
    pub duration_ms: i64,
    pub status: String,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub golden_rules_returned: i64,
    pub heuristics_count: i64,
    pub learnings_count: i64,
    pub experiments_count: i64,
    pub ceo_reviews_count: i64,
    pub query_summary: Option<String>,
}

impl AuditRecord {
    pub fn new(query_type: &str) -> Self {
        Self {
            query_type: query_type.to_string(),
            status: "success".to_string(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: Option<&str>) -> Self {
        self.domain = domain.map(String::from);
        self
    }

    pub fn with_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        let joined = tags.iter().map(|t| t.as_ref()).collect::<Vec<_>>().join(",");
        self.tags = Some(joined);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit_requested = Some(limit);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens_requested = Some(max_tokens);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.query_summary = Some(summary.into());
        self
    }

    /// Fill outcome fields from a finished call.
    pub fn finish<T: Audited>(&mut self, outcome: &Result<T>, elapsed: Duration) {
        self.duration_ms = elapsed.as_millis().min(i64::MAX as u128) as i64;
        match outcome {
            Ok(value) => {
                self.status = "success".to_string();
                value.annotate(self);
            }
            Err(e) => {
                let kind = e.kind();
                self.status = kind.audit_status().to_string();
                self.error_code = Some(kind.code().to_string());
                self.error_message = Some(e.to_string());
            }
        }
    }
}

/// Results that report their own counts into an audit record.
pub trait Audited {
    fn annotate(&self, _record: &mut AuditRecord) {}
}

macro_rules! audited_by_len {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Audited for Vec<$ty> {
                fn annotate(&self, record: &mut AuditRecord) {
                    record.results_returned = self.len() as i64;
                }
            }
        )*
    };
}

audited_by_len!(Decision, Invariant, Assumption, SpikeReport, SimilarFailure, Violation);

impl Audited for Vec<Learning> {
    fn annotate(&self, record: &mut AuditRecord) {
        record.results_returned = self.len() as i64;
        record.learnings_count = self.len() as i64;
    }
}

impl Audited for Vec<Experiment> {
    fn annotate(&self, record: &mut AuditRecord) {
        record.results_returned = self.len() as i64;
        record.experiments_count = self.len() as i64;
    }
}

impl Audited for Vec<PendingReview> {
    fn annotate(&self, record: &mut AuditRecord) {
        record.results_returned = self.len() as i64;
        record.ceo_reviews_count = self.len() as i64;
    }
}

impl Audited for DomainResult {
    fn annotate(&self, record: &mut AuditRecord) {
        record.heuristics_count = self.count.heuristics as i64;
        record.learnings_count = self.count.learnings as i64;
        record.results_returned = record.heuristics_count + record.learnings_count;
    }
}

impl Audited for ViolationSummary {
    fn annotate(&self, record: &mut AuditRecord) {
        record.results_returned = self.total;
    }
}

impl Audited for Statistics {}
impl Audited for IntegrityReport {}

// ─────────────────────────────────────────────────────────────────────────────
// Sinks
// ─────────────────────────────────────────────────────────────────────────────

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Discards every record.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _record: &AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// How long an audit insert waits on a locked store before giving up.
const AUDIT_BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Appends records to the `building_queries` table of the engine's own store.
pub struct StoreAuditSink {
    pool: Arc<ConnectionPool>,
}

impl StoreAuditSink {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

impl AuditSink for StoreAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        let conn = self.pool.acquire()?;
        let outcome = conn.busy_timeout(AUDIT_BUSY_TIMEOUT).and_then(|()| {
            conn.execute(
                "INSERT INTO building_queries
                 (query_type, session_id, agent_id, domain, tags, limit_requested,
                  max_tokens_requested, results_returned, tokens_approximated, duration_ms,
                  status, error_message, error_code, golden_rules_returned, heuristics_count,
                  learnings_count, experiments_count, ceo_reviews_count, query_summary,
                  completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, CURRENT_TIMESTAMP)",
                params![
                    record.query_type,
                    record.session_id,
                    record.agent_id,
                    record.domain,
                    record.tags,
                    record.limit_requested,
                    record.max_tokens_requested,
                    record.results_returned,
                    record.tokens_approximated,
                    record.duration_ms,
                    record.status,
                    record.error_message,
                    record.error_code,
                    record.golden_rules_returned,
                    record.heuristics_count,
                    record.learnings_count,
                    record.experiments_count,
                    record.ceo_reviews_count,
                    record.query_summary,
                ],
            )
        });

        match outcome.and_then(|_| conn.busy_timeout(BUSY_TIMEOUT)) {
            Ok(()) => {
                self.pool.release(conn);
                Ok(())
            }
            Err(e) => {
                self.pool.discard(conn);
                Err(Error::Database(e))
            }
        }
    }
}
