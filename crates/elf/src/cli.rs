//! CLI argument definitions using clap derive macros.
//!
//! The surface is a single flat set of flags: exactly one query flag picks
//! what runs, the rest tune it.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Emergent Learning Framework - query system
///
/// Retrieves heuristics, learnings, decisions and other recorded knowledge,
/// or assembles a tiered context block for an agent task.
#[derive(Parser, Debug)]
#[command(name = "elf")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
Examples:
  elf --context --domain coordination
  elf --domain debugging --limit 5
  elf --tags error,fix --format json
  elf --recent 10 --type failure
  elf --similar \"fix flaky login test\"
  elf --validate

Error codes:
  QS000 general, QS001 validation, QS002 database, QS003 timeout, QS004 configuration")]
pub struct Cli {
    /// Base path to the emergent-learning directory
    #[arg(long, value_name = "PATH")]
    pub base_path: Option<PathBuf>,

    // Queries
    /// Build the full tiered context for an agent
    #[arg(long)]
    pub context: bool,

    /// Task text used by --context
    #[arg(long, value_name = "TEXT", default_value = DEFAULT_TASK)]
    pub task: String,

    /// Query by domain (also scopes --context and the category views)
    #[arg(long, value_name = "NAME")]
    pub domain: Option<String>,

    /// Query by tags (comma-separated)
    #[arg(long, value_name = "a,b,c")]
    pub tags: Option<String>,

    /// Get the N most recent learnings
    #[arg(long, value_name = "N")]
    pub recent: Option<i64>,

    /// Filter --recent by learning type
    #[arg(long = "type", value_name = "TYPE")]
    pub learning_type: Option<String>,

    /// Past failures similar to the given task text
    #[arg(long, value_name = "TEXT")]
    pub similar: Option<String>,

    /// Minimum keyword overlap for --similar (0.0 - 1.0)
    #[arg(long, value_name = "F")]
    pub threshold: Option<f64>,

    // Category views
    /// List active experiments
    #[arg(long)]
    pub experiments: bool,

    /// List pending CEO reviews
    #[arg(long)]
    pub ceo_reviews: bool,

    /// List accepted decisions
    #[arg(long)]
    pub decisions: bool,

    /// List active and violated invariants
    #[arg(long)]
    pub invariants: bool,

    /// List assumptions
    #[arg(long)]
    pub assumptions: bool,

    /// List spike reports
    #[arg(long)]
    pub spikes: bool,

    // Accountability
    /// Display the golden rules
    #[arg(long)]
    pub golden_rules: bool,

    /// Show the golden-rule violation summary
    #[arg(long)]
    pub violations: bool,

    /// Days to look back for violations
    #[arg(long, value_name = "N", default_value_t = 7)]
    pub violation_days: u32,

    /// Show the accountability banner
    #[arg(long)]
    pub accountability_banner: bool,

    // Diagnostics
    /// Display knowledge base statistics
    #[arg(long)]
    pub stats: bool,

    /// Validate database integrity
    #[arg(long)]
    pub validate: bool,

    // Options
    /// Limit number of results (max 1000)
    #[arg(long, value_name = "N", default_value_t = 10, allow_negative_numbers = true)]
    pub limit: i64,

    /// Max tokens for --context (capped by max_context_tokens)
    #[arg(long, value_name = "N", default_value_t = 5000, allow_negative_numbers = true)]
    pub max_tokens: i64,

    /// Query timeout in seconds [default: 30, 60 for --context]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Enable debug logging and full error chains
    #[arg(long)]
    pub debug: bool,
}

pub const DEFAULT_TASK: &str = "Agent task context generation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Csv,
}

/// The one operation a command line selects.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Validate,
    Context,
    GoldenRules,
    Domain(String),
    Tags(String),
    Recent(i64),
    Similar(String),
    Experiments,
    CeoReviews,
    Decisions,
    Invariants,
    Assumptions,
    Spikes,
    Stats,
    Violations,
    AccountabilityBanner,
    Help,
}

impl Cli {
    /// Pick the operation. When several query flags are given the first in
    /// this order wins.
    pub fn query(&self) -> Query {
        if self.validate {
            Query::Validate
        } else if self.context {
            Query::Context
        } else if self.golden_rules {
            Query::GoldenRules
        } else if let Some(text) = &self.similar {
            Query::Similar(text.clone())
        } else if self.experiments {
            Query::Experiments
        } else if self.ceo_reviews {
            Query::CeoReviews
        } else if self.decisions {
            Query::Decisions
        } else if self.invariants {
            Query::Invariants
        } else if self.assumptions {
            Query::Assumptions
        } else if self.spikes {
            Query::Spikes
        } else if let Some(domain) = &self.domain {
            Query::Domain(domain.clone())
        } else if let Some(tags) = &self.tags {
            Query::Tags(tags.clone())
        } else if let Some(n) = self.recent {
            Query::Recent(n)
        } else if self.stats {
            Query::Stats
        } else if self.violations {
            Query::Violations
        } else if self.accountability_banner {
            Query::AccountabilityBanner
        } else {
            Query::Help
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}
