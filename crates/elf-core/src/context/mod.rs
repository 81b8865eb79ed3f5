//! Tiered context assembly.
//!
//! Output order is fixed:
//!
//! 1. Golden-rule document, verbatim
//! 2. Task section
//! 3. Relevant knowledge: similar past failures, ranked heuristics and
//!    learnings, decisions, invariants, assumptions, spike reports
//! 4. Recent filler, appended only while the running size is under budget
//! 5. Active experiments and pending reviews
//!
//! Only step 4 looks at the budget. Everything else is emitted regardless of
//! size, so the result may exceed `max_tokens`.

mod render;

use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::db::types::Learning;
use crate::db::{SIMILARITY_CANDIDATES, Store};
use crate::deadline::Deadline;
use crate::error::Result;
use crate::relevance;
use crate::telemetry::{AuditRecord, Audited};
use crate::validation::{
    validate_domain, validate_max_tokens, validate_tags, validate_text, MAX_LIMIT,
};

/// Default token budget for a context block.
pub const DEFAULT_MAX_TOKENS: i64 = 5000;
/// Characters per token used for budget estimates.
pub const CHARS_PER_TOKEN: usize = 4;

const SIMILAR_FAILURES_SHOWN: usize = 3;
const RANK_CANDIDATES: usize = 10;
const RANKED_SHOWN: usize = 5;
const DECISIONS_SHOWN: usize = 5;
const INVARIANTS_SHOWN: usize = 10;
const ASSUMPTIONS_SHOWN: usize = 5;
const TRUSTED_ASSUMPTION_CONFIDENCE: f64 = 0.7;
const SPIKES_SHOWN: usize = 3;
const FILLER_CANDIDATES: usize = 10;

/// Estimate tokens from text length.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// Inputs for one context assembly.
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub task: String,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    pub max_tokens: i64,
    pub timeout: Option<Duration>,
}

impl ContextRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            domain: None,
            tags: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn audit_record(&self) -> AuditRecord {
        let mut record = AuditRecord::new("build_context")
            .with_domain(self.domain.as_deref())
            .with_max_tokens(self.max_tokens)
            .with_summary(summarize(&self.task));
        if !self.tags.is_empty() {
            record = record.with_tags(&self.tags);
        }
        record
    }

    /// Validate and normalize every field.
    pub(crate) fn validate(&self, token_cap: usize) -> Result<ValidContext> {
        let tags = if self.tags.is_empty() {
            Vec::new()
        } else {
            validate_tags(&self.tags)?
        };
        Ok(ValidContext {
            task: validate_text(&self.task)?,
            domain: self.domain.as_deref().map(validate_domain).transpose()?,
            tags,
            max_tokens: validate_max_tokens(self.max_tokens, token_cap)?,
        })
    }
}

fn summarize(task: &str) -> String {
    let mut summary: String = task.chars().take(100).collect();
    if task.chars().count() > 100 {
        summary.push_str("...");
    }
    summary
}

#[derive(Debug, Clone)]
pub(crate) struct ValidContext {
    pub task: String,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    pub max_tokens: usize,
}

/// How many items each section contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub similar_failures: usize,
    pub heuristics: usize,
    pub learnings: usize,
    pub decisions: usize,
    pub invariants: usize,
    pub violated_invariants: usize,
    pub assumptions: usize,
    pub disputed_assumptions: usize,
    pub spike_reports: usize,
    pub filler: usize,
    pub experiments: usize,
    pub pending_reviews: usize,
}

/// An assembled context block plus what went into it.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub approx_tokens: usize,
    pub max_tokens: usize,
    pub stats: ContextStats,
}

impl Audited for AssembledContext {
    fn annotate(&self, record: &mut AuditRecord) {
        let s = &self.stats;
        record.golden_rules_returned = 1;
        record.heuristics_count = s.heuristics as i64;
        record.learnings_count = (s.learnings + s.filler) as i64;
        record.experiments_count = s.experiments as i64;
        record.ceo_reviews_count = s.pending_reviews as i64;
        record.tokens_approximated = Some(self.approx_tokens as i64);
        record.results_returned = (s.similar_failures
            + s.heuristics
            + s.learnings
            + s.decisions
            + s.invariants
            + s.assumptions
            + s.disputed_assumptions
            + s.spike_reports
            + s.filler
            + s.experiments
            + s.pending_reviews) as i64;
    }
}

/// Build the context block over one store handle.
pub(crate) fn assemble(
    store: &Store<'_>,
    golden_rules: &str,
    request: &ValidContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<AssembledContext> {
    let domain = request.domain.as_deref();
    let max_chars = request.max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let mut stats = ContextStats::default();
    let mut shown: HashSet<i64> = HashSet::new();
    let mut out = String::with_capacity(golden_rules.len() + 4096);

    // Tier 1
    out.push_str(golden_rules);
    if !golden_rules.ends_with('\n') {
        out.push('\n');
    }
    let _ = write!(out, "\n# Task Context\n\n{}\n\n---\n\n", request.task);

    // Tier 2
    out.push_str("# TIER 2: Relevant Knowledge\n\n");

    deadline.check()?;
    let similar = relevance::find_similar(
        &request.task,
        store.recent_failures(SIMILARITY_CANDIDATES)?,
        config.similarity_threshold,
        SIMILAR_FAILURES_SHOWN,
    );
    if !similar.is_empty() {
        out.push_str("## Similar Past Failures (review before starting)\n\n");
        for failure in &similar {
            shown.insert(failure.learning.id);
            out.push_str(&render::similar_failure(failure));
        }
        stats.similar_failures = similar.len();
    }

    if let Some(domain) = domain {
        let _ = write!(out, "## Domain: {}\n\n", domain);
    }
    if !request.tags.is_empty() {
        let _ = write!(out, "## Tag Matches: {}\n\n", request.tags.join(", "));
    }

    deadline.check()?;
    if let Some(domain) = domain {
        let mut heuristics =
            relevance::rank(store.heuristics_by_domain(domain, RANK_CANDIDATES)?, Some(domain));
        heuristics.truncate(RANKED_SHOWN);
        if !heuristics.is_empty() {
            out.push_str("### Heuristics:\n");
            for h in &heuristics {
                out.push_str(&render::heuristic(h));
            }
            stats.heuristics = heuristics.len();
        }
    }

    deadline.check()?;
    let learnings = ranked_learnings(store, domain, &request.tags, &shown)?;
    if !learnings.is_empty() {
        out.push_str("### Learnings:\n");
        for l in &learnings {
            shown.insert(l.id);
            out.push_str(&render::learning(l));
        }
        stats.learnings = learnings.len();
    }

    deadline.check()?;
    let decisions = store.accepted_decisions(domain, DECISIONS_SHOWN)?;
    if !decisions.is_empty() {
        out.push_str("### Decisions:\n");
        for d in &decisions {
            out.push_str(&render::decision(d));
        }
        stats.decisions = decisions.len();
    }

    deadline.check()?;
    let (violated, active): (Vec<_>, Vec<_>) = store
        .invariants(domain, INVARIANTS_SHOWN)?
        .into_iter()
        .partition(|i| i.is_violated());
    if !violated.is_empty() {
        out.push_str("### VIOLATED Invariants:\n");
        for i in &violated {
            out.push_str(&render::invariant(i));
        }
    }
    if !active.is_empty() {
        out.push_str("### Invariants:\n");
        for i in &active {
            out.push_str(&render::invariant(i));
        }
    }
    stats.invariants = violated.len() + active.len();
    stats.violated_invariants = violated.len();

    deadline.check()?;
    let trusted =
        store.trusted_assumptions(domain, TRUSTED_ASSUMPTION_CONFIDENCE, ASSUMPTIONS_SHOWN)?;
    if !trusted.is_empty() {
        out.push_str("### Assumptions:\n");
        for a in &trusted {
            out.push_str(&render::assumption(a));
        }
        stats.assumptions = trusted.len();
    }

    let disputed = store.disputed_assumptions(domain, ASSUMPTIONS_SHOWN)?;
    if !disputed.is_empty() {
        out.push_str("### Challenged Assumptions (do not rely on these):\n");
        for a in &disputed {
            out.push_str(&render::assumption(a));
        }
        stats.disputed_assumptions = disputed.len();
    }

    deadline.check()?;
    let spikes = store.spike_reports(domain, SPIKES_SHOWN)?;
    if !spikes.is_empty() {
        out.push_str("### Spike Reports:\n");
        for s in &spikes {
            out.push_str(&render::spike(s));
        }
        stats.spike_reports = spikes.len();
    }

    // Tier 3
    deadline.check()?;
    let recent = store.recent_learnings(config.recent_window_days, None, FILLER_CANDIDATES)?;
    for l in recent.iter().filter(|l| !shown.contains(&l.id)) {
        if out.chars().count() >= max_chars {
            break;
        }
        if stats.filler == 0 {
            out.push_str("# TIER 3: Recent Context\n\n");
        }
        out.push_str(&render::recent(l));
        stats.filler += 1;
    }

    // Always included
    deadline.check()?;
    let experiments = store.active_experiments(MAX_LIMIT as usize)?;
    if !experiments.is_empty() {
        out.push_str("\n# Active Experiments\n\n");
        for e in &experiments {
            out.push_str(&render::experiment(e));
        }
        stats.experiments = experiments.len();
    }

    let reviews = store.pending_reviews(MAX_LIMIT as usize)?;
    if !reviews.is_empty() {
        out.push_str("\n# Pending CEO Reviews\n\n");
        for r in &reviews {
            out.push_str(&render::review(r));
        }
        stats.pending_reviews = reviews.len();
    }

    let approx_tokens = estimate_tokens(&out);
    debug!(
        "Built context with ~{} tokens (budget {})",
        approx_tokens, request.max_tokens
    );

    Ok(AssembledContext {
        text: out,
        approx_tokens,
        max_tokens: request.max_tokens,
        stats,
    })
}

/// Domain and tag matches, de-duplicated and re-ranked.
fn ranked_learnings(
    store: &Store<'_>,
    domain: Option<&str>,
    tags: &[String],
    already_shown: &HashSet<i64>,
) -> Result<Vec<Learning>> {
    let mut candidates = Vec::new();
    if let Some(domain) = domain {
        candidates.extend(store.learnings_by_domain(domain, RANK_CANDIDATES)?);
    }
    if !tags.is_empty() {
        candidates.extend(store.learnings_by_tags(tags, RANK_CANDIDATES)?);
    }

    let mut seen = HashSet::new();
    candidates.retain(|l| !already_shown.contains(&l.id) && seen.insert(l.id));

    let mut ranked = relevance::rank(candidates, domain);
    ranked.truncate(RANKED_SHOWN);
    Ok(ranked)
}
