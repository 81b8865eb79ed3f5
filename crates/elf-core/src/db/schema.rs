//! Schema creation and integrity checks.
//!
//! The schema SQL is embedded and executed on every engine open.

use rusqlite::Connection;

use super::types::IntegrityReport;
use crate::error::Result;

/// Knowledge store tables (idempotent)
pub const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Tables whose absence makes the store unusable.
pub const REQUIRED_TABLES: &[&str] = &[
    "learnings",
    "heuristics",
    "experiments",
    "ceo_reviews",
    "violations",
    "decisions",
    "invariants",
    "assumptions",
    "spike_reports",
    "building_queries",
];

/// Create missing tables and indexes, then refresh planner statistics.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch("ANALYZE")?;
    Ok(())
}

/// Run every consistency check and collect the outcome. Failures of the
/// checks themselves are recorded as report errors.
pub fn validate(conn: &Connection) -> IntegrityReport {
    let mut report = IntegrityReport {
        valid: true,
        ..Default::default()
    };

    match conn.query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0)) {
        Ok(result) => {
            if result != "ok" {
                report.fail(format!("Database integrity check failed: {}", result));
            }
            report.integrity = Some(result);
        }
        Err(e) => report.fail(format!("Integrity check could not run: {}", e)),
    }

    match count_rows(conn, "PRAGMA foreign_key_check") {
        Ok(0) => {}
        Ok(n) => {
            report.foreign_key_violations = n;
            report.fail(format!("Foreign key violations: {}", n));
        }
        Err(e) => report.fail(format!("Foreign key check could not run: {}", e)),
    }

    match names_of(conn, "table") {
        Ok(tables) => report.tables = tables,
        Err(e) => report.fail(format!("Could not list tables: {}", e)),
    }

    for table in REQUIRED_TABLES {
        if !report.tables.iter().any(|t| t == table) {
            report.fail(format!("Required table '{}' is missing", table));
        }
    }

    match names_of(conn, "index") {
        Ok(indexes) => report.indexes = indexes,
        Err(e) => report.fail(format!("Could not list indexes: {}", e)),
    }

    if !report.indexes.iter().any(|i| i.starts_with("idx_learnings_domain")) {
        report.warnings.push("Some indexes may be missing".to_string());
    }

    for table in REQUIRED_TABLES {
        if !report.tables.iter().any(|t| t == table) {
            continue;
        }
        // Table names come from the fixed list above.
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        match conn.query_row(&sql, [], |row| row.get::<_, i64>(0)) {
            Ok(count) => {
                report.row_counts.insert((*table).to_string(), count);
            }
            Err(e) => report.fail(format!("Could not count rows in '{}': {}", table, e)),
        }
    }

    report
}

impl IntegrityReport {
    fn fail(&mut self, message: String) {
        self.valid = false;
        self.errors.push(message);
    }
}

fn count_rows(conn: &Connection, sql: &str) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut n = 0;
    while rows.next()?.is_some() {
        n += 1;
    }
    Ok(n)
}

fn names_of(conn: &Connection, kind: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")?;
    let names = stmt
        .query_map([kind], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}
