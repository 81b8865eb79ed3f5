//! The query engine.
//!
//! Every public call follows the same skeleton: validate inputs, start a
//! deadline, run the reads on one pooled handle under a watchdog, return the
//! handle (or discard it after any failure), then hand an audit record to the
//! sink. The audit step can neither fail nor alter the call.

use std::collections::HashSet;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::{self, AssembledContext, ContextRequest};
use crate::db::types::{
    Assumption, Decision, DomainCounts, DomainResult, Experiment, IntegrityReport, Invariant,
    Learning, PendingReview, SimilarFailure, SpikeReport, Statistics, Violation,
    ViolationSummary,
};
use crate::db::{schema, ConnectionPool, PoolStats, Store, SIMILARITY_CANDIDATES};
use crate::deadline::{is_interrupt, Deadline, Watchdog};
use crate::error::{Error, Result};
use crate::relevance;
use crate::telemetry::{AuditRecord, AuditSink, Audited, NullAuditSink, StoreAuditSink};
use crate::validation::{
    validate_days, validate_domain, validate_limit, validate_tags, validate_text,
    validate_threshold, MAX_LIMIT,
};

/// Placeholder returned when no golden-rule document exists.
pub const NO_GOLDEN_RULES: &str = "# Golden Rules\n\nNo golden rules have been established yet.";

const ASSUMPTION_STATUSES: &[&str] = &["active", "verified", "challenged", "invalidated"];

pub struct QueryEngine {
    config: EngineConfig,
    pool: Arc<ConnectionPool>,
    audit: Arc<dyn AuditSink>,
    session_id: String,
    agent_id: Option<String>,
}

impl QueryEngine {
    /// Open the store under `config.base_path`, creating the directory and
    /// schema when missing.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let memory_dir = config.memory_dir();
        fs::create_dir_all(&memory_dir).map_err(|e| {
            Error::configuration(format!(
                "Failed to create memory directory {}: {}. Check permissions.",
                memory_dir.display(),
                e
            ))
        })?;

        let pool = Arc::new(ConnectionPool::new(config.db_path(), config.pool_size));
        let conn = pool.acquire()?;
        match schema::initialize(&conn) {
            Ok(()) => pool.release(conn),
            Err(e) => {
                pool.discard(conn);
                return Err(e);
            }
        }

        let audit: Arc<dyn AuditSink> = if config.audit_enabled {
            Arc::new(StoreAuditSink::new(Arc::clone(&pool)))
        } else {
            Arc::new(NullAuditSink)
        };

        let session_id = Uuid::new_v4().to_string();
        debug!(
            "Opened query engine at {} (session {})",
            config.db_path().display(),
            session_id
        );

        Ok(Self {
            config,
            pool,
            audit,
            session_id,
            agent_id: None,
        })
    }

    /// Replace the audit destination.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Attribute audit records to an agent.
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Close every pooled handle. The engine stays usable; new handles are
    /// opened on demand.
    pub fn cleanup(&self) {
        self.pool.close_all();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Knowledge Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Heuristics (by confidence) and learnings (newest first) for a domain.
    pub fn query_by_domain(
        &self,
        domain: &str,
        limit: i64,
        timeout: Option<Duration>,
    ) -> Result<DomainResult> {
        let record = AuditRecord::new("query_by_domain")
            .with_domain(Some(domain))
            .with_limit(limit);

        self.audited(record, || {
            let domain = validate_domain(domain)?;
            let limit = validate_limit(limit)?;
            let deadline = self.deadline(timeout);
            debug!("Querying domain '{}' (limit {})", domain, limit);

            self.with_connection(&deadline, |store| {
                let heuristics = store.heuristics_by_domain(&domain, limit)?;
                let learnings = store.learnings_by_domain(&domain, limit)?;
                let count = DomainCounts {
                    heuristics: heuristics.len(),
                    learnings: learnings.len(),
                };
                Ok(DomainResult {
                    domain: domain.clone(),
                    heuristics,
                    learnings,
                    count,
                })
            })
        })
    }

    /// Learnings carrying any of `tags`, newest first.
    pub fn query_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
        limit: i64,
        timeout: Option<Duration>,
    ) -> Result<Vec<Learning>> {
        let record = AuditRecord::new("query_by_tags")
            .with_tags(tags)
            .with_limit(limit);

        self.audited(record, || {
            let tags = validate_tags(tags)?;
            let limit = validate_limit(limit)?;
            let deadline = self.deadline(timeout);
            debug!("Querying tags {:?} (limit {})", tags, limit);

            self.with_connection(&deadline, |store| store.learnings_by_tags(&tags, limit))
        })
    }

    /// Learnings from the trailing `days` window (default from config).
    pub fn query_recent(
        &self,
        learning_type: Option<&str>,
        limit: i64,
        days: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Learning>> {
        let mut record = AuditRecord::new("query_recent").with_limit(limit);
        if let Some(t) = learning_type {
            record = record.with_summary(format!("type={}", t));
        }

        self.audited(record, || {
            let learning_type = learning_type.map(validate_text).transpose()?;
            let limit = validate_limit(limit)?;
            let days = validate_days(days.unwrap_or(self.config.recent_window_days))?;
            let deadline = self.deadline(timeout);

            self.with_connection(&deadline, |store| {
                store.recent_learnings(days, learning_type.as_deref(), limit)
            })
        })
    }

    /// Past failures whose wording overlaps `task`.
    pub fn find_similar_failures(
        &self,
        task: &str,
        threshold: Option<f64>,
        limit: i64,
        timeout: Option<Duration>,
    ) -> Result<Vec<SimilarFailure>> {
        let record = AuditRecord::new("find_similar_failures")
            .with_limit(limit)
            .with_summary(task.chars().take(100).collect::<String>());

        self.audited(record, || {
            let task = validate_text(task)?;
            let threshold =
                validate_threshold(threshold.unwrap_or(self.config.similarity_threshold))?;
            let limit = validate_limit(limit)?;
            let deadline = self.deadline(timeout);

            self.with_connection(&deadline, |store| {
                let candidates = store.recent_failures(SIMILARITY_CANDIDATES)?;
                Ok(relevance::find_similar(&task, candidates, threshold, limit))
            })
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Workflow Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_active_experiments(&self, timeout: Option<Duration>) -> Result<Vec<Experiment>> {
        self.audited(AuditRecord::new("active_experiments"), || {
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| {
                store.active_experiments(MAX_LIMIT as usize)
            })
        })
    }

    pub fn get_pending_reviews(&self, timeout: Option<Duration>) -> Result<Vec<PendingReview>> {
        self.audited(AuditRecord::new("pending_reviews"), || {
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| store.pending_reviews(MAX_LIMIT as usize))
        })
    }

    /// Accepted decisions for a domain (plus unscoped ones).
    pub fn get_decisions(
        &self,
        domain: Option<&str>,
        limit: i64,
        timeout: Option<Duration>,
    ) -> Result<Vec<Decision>> {
        let record = AuditRecord::new("decisions")
            .with_domain(domain)
            .with_limit(limit);

        self.audited(record, || {
            let domain = domain.map(validate_domain).transpose()?;
            let limit = validate_limit(limit)?;
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| {
                store.accepted_decisions(domain.as_deref(), limit)
            })
        })
    }

    /// Follow supersession pointers from `id` to the current decision.
    pub fn decision_chain(&self, id: i64, timeout: Option<Duration>) -> Result<Vec<Decision>> {
        let record = AuditRecord::new("decision_chain").with_summary(format!("id={}", id));

        self.audited(record, || {
            if id < 1 {
                return Err(Error::validation(format!(
                    "Decision id must be positive. Got: {}.",
                    id
                )));
            }
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| {
                let first = store
                    .decision(id)?
                    .ok_or_else(|| Error::validation(format!("Decision {} not found.", id)))?;

                let mut visited = HashSet::from([first.id]);
                let mut next = first.superseded_by;
                let mut chain = vec![first];

                while let Some(next_id) = next {
                    if !visited.insert(next_id) {
                        return Err(Error::store(format!(
                            "Decision supersession cycle detected at decision {}. \
                             Check database integrity with --validate.",
                            next_id
                        )));
                    }
                    let decision = store.decision(next_id)?.ok_or_else(|| {
                        Error::store(format!(
                            "Decision {} is superseded by missing decision {}.",
                            chain.last().map(|d| d.id).unwrap_or(id),
                            next_id
                        ))
                    })?;
                    next = decision.superseded_by;
                    chain.push(decision);
                }

                Ok(chain)
            })
        })
    }

    /// Active and violated invariants, violated first.
    pub fn get_invariants(
        &self,
        domain: Option<&str>,
        limit: i64,
        timeout: Option<Duration>,
    ) -> Result<Vec<Invariant>> {
        let record = AuditRecord::new("invariants")
            .with_domain(domain)
            .with_limit(limit);

        self.audited(record, || {
            let domain = domain.map(validate_domain).transpose()?;
            let limit = validate_limit(limit)?;
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| store.invariants(domain.as_deref(), limit))
        })
    }

    /// Assumptions, optionally restricted to one status.
    pub fn get_assumptions(
        &self,
        domain: Option<&str>,
        status: Option<&str>,
        limit: i64,
        timeout: Option<Duration>,
    ) -> Result<Vec<Assumption>> {
        let record = AuditRecord::new("assumptions")
            .with_domain(domain)
            .with_limit(limit);

        self.audited(record, || {
            let domain = domain.map(validate_domain).transpose()?;
            let status = status.map(validate_status).transpose()?;
            let limit = validate_limit(limit)?;
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| {
                store.assumptions(domain.as_deref(), status.as_deref(), limit)
            })
        })
    }

    /// Spike reports, most useful first.
    pub fn get_spike_reports(
        &self,
        domain: Option<&str>,
        limit: i64,
        timeout: Option<Duration>,
    ) -> Result<Vec<SpikeReport>> {
        let record = AuditRecord::new("spike_reports")
            .with_domain(domain)
            .with_limit(limit);

        self.audited(record, || {
            let domain = domain.map(validate_domain).transpose()?;
            let limit = validate_limit(limit)?;
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| {
                store.spike_reports(domain.as_deref(), limit)
            })
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accountability & Diagnostics
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_violations(
        &self,
        days: u32,
        acknowledged: Option<bool>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Violation>> {
        let record = AuditRecord::new("violations").with_summary(format!("days={}", days));

        self.audited(record, || {
            let days = validate_days(days)?;
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| store.violations(days, acknowledged))
        })
    }

    pub fn get_violation_summary(
        &self,
        days: u32,
        timeout: Option<Duration>,
    ) -> Result<ViolationSummary> {
        let record =
            AuditRecord::new("violation_summary").with_summary(format!("days={}", days));

        self.audited(record, || {
            let days = validate_days(days)?;
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| store.violation_summary(days))
        })
    }

    pub fn get_statistics(&self, timeout: Option<Duration>) -> Result<Statistics> {
        self.audited(AuditRecord::new("statistics"), || {
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| store.statistics())
        })
    }

    /// Run the store consistency checks. Check failures land in the report.
    pub fn validate_database(&self, timeout: Option<Duration>) -> Result<IntegrityReport> {
        self.audited(AuditRecord::new("validate_database"), || {
            let deadline = self.deadline(timeout);
            self.with_connection(&deadline, |store| Ok(schema::validate(store.connection())))
        })
    }

    /// The golden-rule document. Never fails: a missing file yields a
    /// placeholder and an unreadable one a document describing the error.
    pub fn get_golden_rules(&self) -> String {
        let started = Instant::now();
        let outcome: Result<GoldenRules> = Ok(GoldenRules(self.read_golden_rules()));
        self.finish(AuditRecord::new("golden_rules"), &outcome, started);
        outcome.map(|g| g.0).unwrap_or_default()
    }

    fn read_golden_rules(&self) -> String {
        let path = self.config.golden_rules_path();
        if !path.exists() {
            return NO_GOLDEN_RULES.to_string();
        }
        match fs::read_to_string(&path) {
            Ok(content) => {
                debug!("Loaded golden rules ({} chars)", content.len());
                content
            }
            Err(e) => {
                warn!("Failed to read golden rules from {}: {}", path.display(), e);
                format!("# Error Reading Golden Rules\n\nError: {}", e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Context Assembly
    // ─────────────────────────────────────────────────────────────────────────

    /// Assemble the tiered context block for a task.
    pub fn build_context(&self, request: &ContextRequest) -> Result<String> {
        self.assemble_context(request).map(|ctx| ctx.text)
    }

    /// Like [`build_context`](Self::build_context), with per-section counts.
    pub fn assemble_context(&self, request: &ContextRequest) -> Result<AssembledContext> {
        self.audited(request.audit_record(), || {
            let valid = request.validate(self.config.max_context_tokens)?;
            let limit = request.timeout.filter(|t| !t.is_zero());
            let deadline = Deadline::after(limit.unwrap_or(self.config.context_timeout()));
            debug!(
                "Building context (domain={:?}, tags={:?}, max_tokens={})",
                valid.domain, valid.tags, valid.max_tokens
            );

            let golden = self.read_golden_rules();
            self.with_connection(&deadline, |store| {
                context::assemble(store, &golden, &valid, &self.config, &deadline)
            })
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// A zero timeout means "use the default", as an unset one does.
    fn deadline(&self, timeout: Option<Duration>) -> Deadline {
        let limit = timeout.filter(|t| !t.is_zero());
        Deadline::after(limit.unwrap_or(self.config.default_timeout()))
    }

    /// Run `work` on one pooled handle under the deadline's watchdog.
    ///
    /// Once the watchdog has fired the call is a timeout, even if the work
    /// managed to finish.
    fn with_connection<T>(
        &self,
        deadline: &Deadline,
        work: impl FnOnce(&Store<'_>) -> Result<T>,
    ) -> Result<T> {
        deadline.check()?;
        let conn = self.pool.acquire()?;
        let watchdog = Watchdog::arm(deadline, conn.get_interrupt_handle());

        let outcome = work(&Store::new(&conn));
        let fired = watchdog.disarm();

        match outcome {
            Ok(value) if !fired => {
                self.pool.release(conn);
                Ok(value)
            }
            Ok(_) => {
                warn!(
                    "Deadline of {:?} passed during query, discarding connection",
                    deadline.limit()
                );
                self.pool.discard(conn);
                Err(Error::timeout(deadline.limit()))
            }
            Err(e) => {
                warn!("Discarding connection after failed query: {}", e);
                self.pool.discard(conn);
                let interrupted = matches!(&e, Error::Database(db) if is_interrupt(db));
                if fired || interrupted || e.is_timeout() {
                    Err(Error::timeout(deadline.limit()))
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Run a call and record its outcome.
    fn audited<T: Audited>(
        &self,
        record: AuditRecord,
        call: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let started = Instant::now();
        let outcome = call();
        self.finish(record, &outcome, started);
        outcome
    }

    fn finish<T: Audited>(&self, mut record: AuditRecord, outcome: &Result<T>, started: Instant) {
        record.session_id = Some(self.session_id.clone());
        record.agent_id = self.agent_id.clone();
        record.finish(outcome, started.elapsed());

        let sink = Arc::clone(&self.audit);
        match panic::catch_unwind(AssertUnwindSafe(|| sink.record(&record))) {
            Ok(Ok(())) => debug!("Recorded audit entry for {}", record.query_type),
            Ok(Err(e)) => warn!("Failed to record audit entry for {}: {}", record.query_type, e),
            Err(_) => warn!("Audit sink panicked while recording {}", record.query_type),
        }
    }
}

impl Drop for QueryEngine {
    fn drop(&mut self) {
        self.cleanup();
    }
}

struct GoldenRules(String);

impl Audited for GoldenRules {
    fn annotate(&self, record: &mut AuditRecord) {
        record.golden_rules_returned = 1;
        record.results_returned = 1;
        record.tokens_approximated = Some(context::estimate_tokens(&self.0) as i64);
    }
}

fn validate_status(status: &str) -> Result<String> {
    let status = status.trim().to_lowercase();
    if ASSUMPTION_STATUSES.contains(&status.as_str()) {
        Ok(status)
    } else {
        Err(Error::validation(format!(
            "Unknown assumption status '{}'. Use one of: {}.",
            status,
            ASSUMPTION_STATUSES.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Seed;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ENDLESS: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                           SELECT count(*) FROM c";

    fn open_engine() -> (TempDir, QueryEngine) {
        let dir = TempDir::new().unwrap();
        let engine = QueryEngine::open(EngineConfig::new(dir.path())).unwrap();
        (dir, engine)
    }

    fn writer(engine: &QueryEngine) -> Connection {
        Connection::open(engine.config().db_path()).unwrap()
    }

    fn audit_rows(engine: &QueryEngine) -> Vec<(String, String, Option<String>)> {
        let conn = writer(engine);
        let mut stmt = conn
            .prepare("SELECT query_type, status, error_code FROM building_queries ORDER BY id")
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn record(&self, _record: &AuditRecord) -> Result<()> {
            Err(Error::store("audit table is locked"))
        }
    }

    struct PanickingSink;

    impl AuditSink for PanickingSink {
        fn record(&self, _record: &AuditRecord) -> Result<()> {
            panic!("audit sink exploded");
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        records: Mutex<Vec<AuditRecord>>,
        calls: AtomicUsize,
    }

    impl AuditSink for CollectingSink {
        fn record(&self, record: &AuditRecord) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn test_query_by_domain_ordering_and_counts() {
        let (_dir, engine) = open_engine();
        let conn = writer(&engine);
        let seed = Seed::new(&conn);
        seed.heuristic("testing", "medium", 0.7, 0);
        seed.heuristic("testing", "high", 0.9, 0);
        seed.heuristic("testing", "low", 0.5, 0);
        seed.learning_at("older", "failure", Some("testing"), "-3 days");
        seed.learning_at("newer", "success", Some("testing"), "-1 hours");

        let result = engine.query_by_domain("testing", 10, None).unwrap();
        let confidences: Vec<f64> = result.heuristics.iter().map(|h| h.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7, 0.5]);
        let titles: Vec<&str> = result.learnings.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["newer", "older"]);
        assert_eq!(
            result.count,
            DomainCounts {
                heuristics: 3,
                learnings: 2
            }
        );
    }

    #[test]
    fn test_query_by_tags_matches_literal_percent() {
        let (_dir, engine) = open_engine();
        let conn = writer(&engine);
        let seed = Seed::new(&conn);
        seed.learning_tagged("literal", "100%cpu");
        seed.learning_tagged("lookalike", "100xcpu");

        let found = engine.query_by_tags(&["perf", "100%cpu"], 10, None).unwrap();
        let titles: Vec<&str> = found.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["literal"]);
    }

    #[test]
    fn test_build_context_golden_rules_exceed_budget() {
        let (_dir, engine) = open_engine();
        let golden = format!("# Golden Rules\n\n{}", "x".repeat(1984));
        assert_eq!(golden.len(), 2000);
        fs::write(engine.config().golden_rules_path(), &golden).unwrap();

        let conn = writer(&engine);
        Seed::new(&conn).learning_at("recent note", "observation", None, "-1 hours");

        let request = ContextRequest::new("fix login bug")
            .with_domain("auth")
            .with_max_tokens(50);
        let text = engine.build_context(&request).unwrap();

        assert!(text.starts_with(&golden));
        assert!(!text.contains("TIER 3"));
        assert!(!text.contains("recent note"));
    }

    #[test]
    fn test_failed_handle_is_discarded() {
        let (_dir, engine) = open_engine();
        engine.query_by_domain("testing", 5, None).unwrap();
        let before = engine.pool_stats();
        assert!(before.idle >= 1);

        let deadline = engine.deadline(None);
        let err = engine
            .with_connection(&deadline, |store| {
                store.connection().execute_batch("SELECT * FROM no_such_table")?;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Store);

        let after_error = engine.pool_stats();
        assert_eq!(after_error.idle, before.idle - 1);
        assert_eq!(after_error.created, before.created);

        // Drain idle handles so the next acquire must open a fresh one.
        engine.cleanup();
        let _conn = engine.pool.acquire().unwrap();
        assert_eq!(engine.pool_stats().created, before.created + 1);
    }

    #[test]
    fn test_slow_statement_times_out() {
        let (_dir, engine) = open_engine();
        let before = engine.pool_stats().created;
        let deadline = Deadline::after(Duration::from_millis(300));

        let started = Instant::now();
        let err = engine
            .with_connection(&deadline, |store| {
                let n: i64 = store.connection().query_row(ENDLESS, [], |row| row.get(0))?;
                Ok(n)
            })
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.kind().exit_code(), 3);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(engine.pool_stats().idle, 0);

        engine.pool.acquire().unwrap();
        assert_eq!(engine.pool_stats().created, before + 1);
    }

    #[test]
    fn test_work_finishing_after_deadline_is_timeout() {
        let (_dir, engine) = open_engine();
        let deadline = Deadline::after(Duration::from_millis(200));

        let err = engine
            .with_connection(&deadline, |_store| {
                std::thread::sleep(Duration::from_millis(400));
                Ok(1)
            })
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(engine.pool_stats().idle, 0);
    }

    #[test]
    fn test_statement_started_after_deadline_is_interrupted() {
        let (_dir, engine) = open_engine();
        let deadline = Deadline::after(Duration::from_millis(200));

        let started = Instant::now();
        let err = engine
            .with_connection(&deadline, |store| {
                std::thread::sleep(Duration::from_millis(400));
                let n: i64 = store.connection().query_row(ENDLESS, [], |row| row.get(0))?;
                Ok(n)
            })
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_public_query_stops_at_deadline() {
        let (_dir, engine) = open_engine();
        writer(&engine)
            .execute_batch(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 300000)
                 INSERT INTO learnings (type, title, created_at)
                 SELECT 'observation', 'bulk ' || x, datetime('now', '-' || (x % 1000) || ' minutes')
                 FROM c",
            )
            .unwrap();

        let started = Instant::now();
        let err = engine
            .query_recent(None, 1000, Some(3650), Some(Duration::from_millis(30)))
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let (_dir, engine) = open_engine();
        assert!(engine.query_by_domain("testing", 10, Some(Duration::ZERO)).is_ok());
        assert!(engine.get_statistics(Some(Duration::ZERO)).is_ok());

        let request = ContextRequest::new("write docs").with_timeout(Duration::ZERO);
        assert!(engine.build_context(&request).is_ok());
    }

    #[test]
    fn test_expired_deadline_is_timeout_and_audited() {
        let (_dir, engine) = open_engine();
        let err = engine
            .query_by_domain("testing", 10, Some(Duration::from_nanos(1)))
            .unwrap_err();
        assert!(err.is_timeout());

        let rows = audit_rows(&engine);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "timeout");
        assert_eq!(rows[0].2.as_deref(), Some("QS003"));
    }

    #[test]
    fn test_invalid_inputs_raise_validation() {
        let (_dir, engine) = open_engine();
        assert!(engine.query_by_domain("a/b", 10, None).unwrap_err().is_validation());
        assert!(engine.query_by_domain("testing", 0, None).unwrap_err().is_validation());
        assert!(engine.query_by_domain("testing", 1001, None).unwrap_err().is_validation());
        assert!(engine.query_by_tags::<&str>(&[], 10, None).unwrap_err().is_validation());
        assert!(engine
            .get_assumptions(None, Some("maybe"), 10, None)
            .unwrap_err()
            .is_validation());

        let rows = audit_rows(&engine);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|(_, status, code)| {
            status == "error" && code.as_deref() == Some("QS001")
        }));
    }

    #[test]
    fn test_telemetry_failure_never_changes_result() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::new(dir.path());
        {
            let engine = QueryEngine::open(config.clone()).unwrap();
            let conn = writer(&engine);
            let seed = Seed::new(&conn);
            seed.heuristic("testing", "rule", 0.8, 2);
            seed.learning_at("note", "observation", Some("testing"), "-1 hours");
        }

        let baseline = QueryEngine::open(config.clone())
            .unwrap()
            .with_audit_sink(Arc::new(NullAuditSink))
            .query_by_domain("testing", 10, None)
            .unwrap();

        let failing = QueryEngine::open(config.clone())
            .unwrap()
            .with_audit_sink(Arc::new(FailingSink));
        assert_eq!(failing.query_by_domain("testing", 10, None).unwrap(), baseline);
        assert!(failing.query_by_domain("a/b", 10, None).unwrap_err().is_validation());

        let panicking = QueryEngine::open(config)
            .unwrap()
            .with_audit_sink(Arc::new(PanickingSink));
        assert_eq!(panicking.query_by_domain("testing", 10, None).unwrap(), baseline);
        assert!(!panicking.get_golden_rules().is_empty());
    }

    #[test]
    fn test_every_call_is_audited() {
        let (_dir, engine) = open_engine();
        let sink = Arc::new(CollectingSink::default());
        let engine = engine.with_audit_sink(sink.clone()).with_agent_id("agent-7");

        engine.query_by_domain("testing", 10, None).unwrap();
        engine.query_recent(None, 10, None, None).unwrap();
        engine.get_golden_rules();
        engine
            .build_context(&ContextRequest::new("write tests"))
            .unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
        let records = sink.records.lock().unwrap();
        let kinds: Vec<&str> = records.iter().map(|r| r.query_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["query_by_domain", "query_recent", "golden_rules", "build_context"]
        );
        assert!(records.iter().all(|r| r.session_id.as_deref() == Some(engine.session_id())));
        assert!(records.iter().all(|r| r.agent_id.as_deref() == Some("agent-7")));
        assert_eq!(records[3].golden_rules_returned, 1);
        assert!(records[3].tokens_approximated.unwrap() > 0);
    }

    #[test]
    fn test_audit_rows_written_to_store() {
        let (_dir, engine) = open_engine();
        let conn = writer(&engine);
        Seed::new(&conn).heuristic("testing", "rule", 0.8, 0);

        engine.query_by_domain("testing", 10, None).unwrap();

        let (kind, status, heuristics): (String, String, i64) = conn
            .query_row(
                "SELECT query_type, status, heuristics_count FROM building_queries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(kind, "query_by_domain");
        assert_eq!(status, "success");
        assert_eq!(heuristics, 1);
    }

    #[test]
    fn test_audit_disabled_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = QueryEngine::open(EngineConfig::new(dir.path()).with_audit(false)).unwrap();
        engine.query_by_domain("testing", 10, None).unwrap();
        assert!(audit_rows(&engine).is_empty());
    }

    #[test]
    fn test_pool_stays_within_cap() {
        let (_dir, engine) = open_engine();
        for _ in 0..20 {
            engine.query_by_domain("testing", 10, None).unwrap();
            engine.get_statistics(None).unwrap();
        }
        let stats = engine.pool_stats();
        assert!(stats.idle <= stats.capacity);
        assert_eq!(stats.capacity, 5);
    }

    #[test]
    fn test_decision_chain_follows_supersession() {
        let (_dir, engine) = open_engine();
        let conn = writer(&engine);
        let seed = Seed::new(&conn);
        let current = seed.decision("v3", None, "accepted", None);
        let middle = seed.decision("v2", None, "superseded", Some(current));
        let first = seed.decision("v1", None, "superseded", Some(middle));

        let chain = engine.decision_chain(first, None).unwrap();
        let titles: Vec<&str> = chain.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["v1", "v2", "v3"]);

        assert!(engine.decision_chain(9999, None).unwrap_err().is_validation());
    }

    #[test]
    fn test_decision_cycle_is_store_error() {
        let (_dir, engine) = open_engine();
        let conn = writer(&engine);
        let seed = Seed::new(&conn);
        let a = seed.decision("a", None, "superseded", None);
        let b = seed.decision("b", None, "superseded", Some(a));
        conn.execute(
            "UPDATE decisions SET superseded_by = ?1 WHERE id = ?2",
            rusqlite::params![b, a],
        )
        .unwrap();

        let err = engine.decision_chain(a, None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Store);
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_golden_rules_missing_and_present() {
        let (_dir, engine) = open_engine();
        assert_eq!(engine.get_golden_rules(), NO_GOLDEN_RULES);

        fs::write(engine.config().golden_rules_path(), "# Golden Rules\n\n1. Query first\n")
            .unwrap();
        assert!(engine.get_golden_rules().contains("Query first"));
    }

    #[test]
    fn test_validate_database_on_fresh_store() {
        let (_dir, engine) = open_engine();
        let report = engine.validate_database(None).unwrap();
        assert!(report.valid, "errors: {:?}", report.errors);
        assert!(report.tables.iter().any(|t| t == "building_queries"));
    }

    #[test]
    fn test_similar_failures_through_engine() {
        let (_dir, engine) = open_engine();
        let conn = writer(&engine);
        Seed::new(&conn).failure(
            "Login token expired",
            "login session token refresh failed",
            "-2 days",
        );

        let matches = engine
            .find_similar_failures("login session token refresh", None, 5, None)
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert!(engine
            .find_similar_failures("login", Some(2.0), 5, None)
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_open_fails_with_configuration_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let err = QueryEngine::open(EngineConfig::new(&blocker)).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert_eq!(err.code(), "QS004");
    }
}
