//! Engine Configuration
//!
//! Defines configuration options for the query engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Query engine configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the emergent-learning directory (default: ~/.claude/emergent-learning)
    pub base_path: PathBuf,

    /// Maximum number of idle store handles kept for reuse (default: 5)
    pub pool_size: usize,

    /// Per-call deadline in seconds (default: 30)
    pub default_timeout_secs: u64,

    /// Deadline for a whole context assembly in seconds (default: 60)
    pub context_timeout_secs: u64,

    /// Hard cap on the context token budget (default: 50000)
    pub max_context_tokens: usize,

    /// Trailing window for recent-item queries in days (default: 2)
    pub recent_window_days: u32,

    /// Minimum keyword overlap for a past failure to count as similar (default: 0.15)
    pub similarity_threshold: f64,

    /// Write a query-audit record after every call (default: true)
    pub audit_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            pool_size: 5,
            default_timeout_secs: 30,
            context_timeout_secs: 60,
            max_context_tokens: 50_000,
            recent_window_days: 2,
            similarity_threshold: 0.15,
            audit_enabled: true,
        }
    }
}

fn default_base_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("emergent-learning")
}

impl EngineConfig {
    /// Create a config rooted at the given base path
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// Set the pool capacity
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the default per-call timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    /// Set the context assembly timeout
    pub fn with_context_timeout_secs(mut self, secs: u64) -> Self {
        self.context_timeout_secs = secs;
        self
    }

    /// Enable or disable audit records
    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    /// Directory holding the store file and the golden-rules document
    pub fn memory_dir(&self) -> PathBuf {
        self.base_path.join("memory")
    }

    /// Path to the embedded store file
    pub fn db_path(&self) -> PathBuf {
        self.memory_dir().join("index.db")
    }

    /// Path to the golden-rules document
    pub fn golden_rules_path(&self) -> PathBuf {
        self.memory_dir().join("golden-rules.md")
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn context_timeout(&self) -> Duration {
        Duration::from_secs(self.context_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.base_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingBasePath);
        }

        if self.pool_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "pool_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.default_timeout_secs == 0 || self.context_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "timeout".into(),
                message: "must be greater than 0".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigValidationError::InvalidValue {
                field: "similarity_threshold".into(),
                message: "must be between 0 and 1".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("base_path is required")]
    MissingBasePath,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<ConfigValidationError> for crate::Error {
    fn from(e: ConfigValidationError) -> Self {
        crate::Error::configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.max_context_tokens, 50_000);
        assert_eq!(config.recent_window_days, 2);
        assert!(config.base_path.ends_with(".claude/emergent-learning"));
    }

    #[test]
    fn test_derived_paths() {
        let config = EngineConfig::new("/tmp/elf");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/elf/memory/index.db"));
        assert_eq!(
            config.golden_rules_path(),
            PathBuf::from("/tmp/elf/memory/golden-rules.md")
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::new("/tmp/elf");
        assert!(config.validate().is_ok());

        config.pool_size = 0;
        assert!(config.validate().is_err());

        let config = EngineConfig::new("/tmp/elf").with_timeout_secs(0);
        assert!(config.validate().is_err());

        let config = EngineConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingBasePath)
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"pool_size": 2}"#).unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.default_timeout_secs, 30);
    }
}
