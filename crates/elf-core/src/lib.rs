//! elf-core - Knowledge retrieval engine for the Emergent Learning Framework
//!
//! This crate reads the learning memory that coding-agent sessions accumulate
//! (heuristics, failures, decisions, invariants, research notes) and turns it
//! into a bounded context block before each new task:
//!
//! - **validation**: Input checks applied before the store is touched
//! - **db**: Connection pool, schema, and read queries over SQLite
//! - **deadline**: Per-call deadlines enforced by a watchdog
//! - **relevance**: Recency/domain scoring and failure similarity
//! - **context**: Tiered, token-budgeted context assembly
//! - **telemetry**: Best-effort query audit trail
//! - **engine**: The `QueryEngine` tying it all together

pub mod config;
pub mod context;
pub mod db;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod relevance;
pub mod telemetry;
pub mod validation;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{ConfigValidationError, EngineConfig};
pub use context::{AssembledContext, ContextRequest, ContextStats};
pub use db::types::*;
pub use db::PoolStats;
pub use engine::{QueryEngine, NO_GOLDEN_RULES};
pub use error::{Error, ErrorKind, Result};
pub use deadline::Deadline;
pub use telemetry::{AuditRecord, AuditSink, NullAuditSink, StoreAuditSink};
