//! Error types for elf-core.
//!
//! Every error belongs to one of four stable kinds (plus a generic fallback).
//! The kind carries a code that is part of the public contract: callers and
//! the CLI branch on [`ErrorKind`], never on message text.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using elf-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for query engine operations
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("{message} [QS001]")]
    Validation { message: String },

    // Store errors
    #[error("Database operation failed: {0}. Check database integrity with --validate. [QS002]")]
    Database(#[from] rusqlite::Error),

    #[error("{message} [QS002]")]
    Store { message: String },

    // Deadline errors
    #[error(
        "Query timed out after {} seconds. Try reducing --limit or increasing --timeout. [QS003]",
        .limit.as_secs_f64()
    )]
    Timeout { limit: Duration },

    // Setup errors
    #[error("{message} [QS004]")]
    Configuration { message: String },

    // IO errors
    #[error("IO error: {0} [QS000]")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0} [QS000]")]
    Serialization(#[from] serde_json::Error),
}

/// Error taxonomy shared by the library and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    General,
    Validation,
    Store,
    Timeout,
    Configuration,
}

impl ErrorKind {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::General => "QS000",
            ErrorKind::Validation => "QS001",
            ErrorKind::Store => "QS002",
            ErrorKind::Timeout => "QS003",
            ErrorKind::Configuration => "QS004",
        }
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::Store => 2,
            ErrorKind::Timeout => 3,
            ErrorKind::General | ErrorKind::Validation | ErrorKind::Configuration => 1,
        }
    }

    /// Status string written to the audit table.
    pub fn audit_status(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            _ => "error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::General => write!(f, "general"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Store => write!(f, "store"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Configuration => write!(f, "configuration"),
        }
    }
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a store error that did not originate in SQLite itself
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a timeout error for the given deadline
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout { limit }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Database(_) | Error::Store { .. } => ErrorKind::Store,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Io(_) | Error::Serialization(_) => ErrorKind::General,
        }
    }

    /// Stable code for this error.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::validation("bad").code(), "QS001");
        assert_eq!(Error::store("locked").code(), "QS002");
        assert_eq!(Error::timeout(Duration::from_secs(1)).code(), "QS003");
        assert_eq!(Error::configuration("no dir").code(), "QS004");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(Error::from(io).code(), "QS000");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ErrorKind::Validation.exit_code(), 1);
        assert_eq!(ErrorKind::Store.exit_code(), 2);
        assert_eq!(ErrorKind::Timeout.exit_code(), 3);
        assert_eq!(ErrorKind::Configuration.exit_code(), 1);
        assert_eq!(ErrorKind::General.exit_code(), 1);
    }

    #[test]
    fn test_messages_carry_guidance() {
        let err = Error::timeout(Duration::from_secs(30));
        let msg = err.to_string();
        assert!(msg.contains("30 seconds"));
        assert!(msg.contains("--limit"));
        assert!(msg.contains("[QS003]"));

        let err = Error::from(rusqlite::Error::InvalidQuery);
        assert!(err.to_string().contains("--validate"));
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
