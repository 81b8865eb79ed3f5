//! Row seeding for store-backed tests.

use rusqlite::{Connection, params};

use crate::db::schema;

/// In-memory store with the full schema applied.
pub fn seeded_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    schema::initialize(&conn).unwrap();
    conn
}

/// Inserts rows the way external recording hooks would.
pub struct Seed<'c> {
    conn: &'c Connection,
}

impl<'c> Seed<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn last_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    pub fn heuristic(&self, domain: &str, rule: &str, confidence: f64, validated: i64) -> i64 {
        self.conn
            .execute(
                "INSERT INTO heuristics (domain, rule, explanation, confidence, times_validated)
                 VALUES (?1, ?2, 'because', ?3, ?4)",
                params![domain, rule, confidence, validated],
            )
            .unwrap();
        self.last_id()
    }

    pub fn golden_heuristic(&self, domain: &str, rule: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO heuristics (domain, rule, confidence, is_golden)
                 VALUES (?1, ?2, 0.95, 1)",
                params![domain, rule],
            )
            .unwrap();
        self.last_id()
    }

    /// Learning created `offset` ago, e.g. `"-3 days"`.
    pub fn learning_at(
        &self,
        title: &str,
        learning_type: &str,
        domain: Option<&str>,
        offset: &str,
    ) -> i64 {
        self.conn
            .execute(
                "INSERT INTO learnings (type, filepath, title, summary, domain, created_at)
                 VALUES (?1, 'failures/x.md', ?2, 'summary', ?3, datetime('now', ?4))",
                params![learning_type, title, domain, offset],
            )
            .unwrap();
        self.last_id()
    }

    pub fn learning_tagged(&self, title: &str, tags: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO learnings (type, title, summary, tags)
                 VALUES ('observation', ?1, 'summary', ?2)",
                params![title, tags],
            )
            .unwrap();
        self.last_id()
    }

    pub fn failure(&self, title: &str, summary: &str, offset: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO learnings (type, title, summary, created_at)
                 VALUES ('failure', ?1, ?2, datetime('now', ?3))",
                params![title, summary, offset],
            )
            .unwrap();
        self.last_id()
    }

    pub fn decision(
        &self,
        title: &str,
        domain: Option<&str>,
        status: &str,
        superseded_by: Option<i64>,
    ) -> i64 {
        self.conn
            .execute(
                "INSERT INTO decisions (title, decision, rationale, domain, status, superseded_by)
                 VALUES (?1, 'do it', 'it works', ?2, ?3, ?4)",
                params![title, domain, status, superseded_by],
            )
            .unwrap();
        self.last_id()
    }

    pub fn invariant(&self, statement: &str, status: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO invariants (statement, rationale, status, violation_count)
                 VALUES (?1, 'safety', ?2, CASE WHEN ?2 = 'violated' THEN 1 ELSE 0 END)",
                params![statement, status],
            )
            .unwrap();
        self.last_id()
    }

    pub fn assumption(&self, text: &str, confidence: f64, status: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO assumptions (assumption, context, confidence, status)
                 VALUES (?1, 'ctx', ?2, ?3)",
                params![text, confidence, status],
            )
            .unwrap();
        self.last_id()
    }

    pub fn spike(&self, title: &str, usefulness: f64) -> i64 {
        self.conn
            .execute(
                "INSERT INTO spike_reports (title, topic, question, findings, usefulness_score,
                                            time_invested_minutes)
                 VALUES (?1, 'topic', 'why?', 'because', ?2, 30)",
                params![title, usefulness],
            )
            .unwrap();
        self.last_id()
    }

    pub fn experiment(&self, name: &str, status: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO experiments (name, hypothesis, status) VALUES (?1, 'maybe', ?2)",
                params![name, status],
            )
            .unwrap();
        self.last_id()
    }

    pub fn review(&self, title: &str, status: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO ceo_reviews (title, context, recommendation, status)
                 VALUES (?1, 'ctx', 'approve', ?2)",
                params![title, status],
            )
            .unwrap();
        self.last_id()
    }

    pub fn violation(&self, rule_id: i64, rule_name: &str, acknowledged: bool, offset: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO violations (rule_id, rule_name, description, acknowledged,
                                         violation_date)
                 VALUES (?1, ?2, 'skipped the check', ?3, datetime('now', ?4))",
                params![rule_id, rule_name, acknowledged, offset],
            )
            .unwrap();
        self.last_id()
    }
}
