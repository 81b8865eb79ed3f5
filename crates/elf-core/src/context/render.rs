//! Markdown entries for each knowledge category.

use std::fmt::Write as _;

use crate::db::types::{
    Assumption, Decision, Experiment, Heuristic, Invariant, Learning, PendingReview,
    SimilarFailure, SpikeReport,
};

pub(super) fn similar_failure(s: &SimilarFailure) -> String {
    let l = &s.learning;
    let mut entry = format!(
        "- [WARNING] **{}** (similarity: {:.0}%, keywords: {})\n",
        l.title,
        s.similarity * 100.0,
        s.matched_keywords.join(", ")
    );
    if let Some(summary) = non_empty(&l.summary) {
        let _ = writeln!(entry, "  {}", summary);
    }
    entry.push('\n');
    entry
}

pub(super) fn heuristic(h: &Heuristic) -> String {
    let mut entry = format!(
        "- **{}** (confidence: {:.2}, validated: {}x)\n",
        h.rule, h.confidence, h.times_validated
    );
    if let Some(explanation) = non_empty(&h.explanation) {
        let _ = writeln!(entry, "  {}", explanation);
    }
    entry.push('\n');
    entry
}

pub(super) fn learning(l: &Learning) -> String {
    let mut entry = format!("- **{}** ({}", l.title, l.learning_type);
    if let Some(domain) = non_empty(&l.domain) {
        let _ = write!(entry, ", domain: {}", domain);
    }
    entry.push_str(")\n");
    if let Some(summary) = non_empty(&l.summary) {
        let _ = writeln!(entry, "  {}", summary);
    }
    if let Some(tags) = non_empty(&l.tags) {
        let _ = writeln!(entry, "  Tags: {}", tags);
    }
    entry.push('\n');
    entry
}

pub(super) fn decision(d: &Decision) -> String {
    let mut entry = format!("- **{}**: {}\n", d.title, d.decision);
    if let Some(rationale) = non_empty(&d.rationale) {
        let _ = writeln!(entry, "  Rationale: {}", rationale);
    }
    entry.push('\n');
    entry
}

pub(super) fn invariant(i: &Invariant) -> String {
    let mut entry = if i.is_violated() {
        format!(
            "- [VIOLATED] {} ({}, scope: {}, violated {}x)\n",
            i.statement, i.severity, i.scope, i.violation_count
        )
    } else {
        format!("- {} ({}, scope: {})\n", i.statement, i.severity, i.scope)
    };
    if let Some(rationale) = non_empty(&i.rationale) {
        let _ = writeln!(entry, "  Why: {}", rationale);
    }
    entry.push('\n');
    entry
}

pub(super) fn assumption(a: &Assumption) -> String {
    let mut entry = if a.is_disputed() {
        format!(
            "- [{}] {} (challenged {}x)\n",
            a.status.to_uppercase(),
            a.assumption,
            a.challenged_count
        )
    } else {
        format!(
            "- {} (confidence: {:.2}, {}, verified {}x)\n",
            a.assumption, a.confidence, a.status, a.verified_count
        )
    };
    if let Some(context) = non_empty(&a.context) {
        let _ = writeln!(entry, "  Context: {}", context);
    }
    entry.push('\n');
    entry
}

pub(super) fn spike(s: &SpikeReport) -> String {
    let mut entry = format!(
        "- **{}** (usefulness: {:.1}/5, {} min invested)\n",
        s.title, s.usefulness_score, s.time_invested_minutes
    );
    if let Some(question) = non_empty(&s.question) {
        let _ = writeln!(entry, "  Question: {}", question);
    }
    if let Some(findings) = non_empty(&s.findings) {
        let _ = writeln!(entry, "  Findings: {}", findings);
    }
    if let Some(gotchas) = non_empty(&s.gotchas) {
        let _ = writeln!(entry, "  Gotchas: {}", gotchas);
    }
    entry.push('\n');
    entry
}

pub(super) fn recent(l: &Learning) -> String {
    let mut entry = format!(
        "- **{}** ({}, {})\n",
        l.title,
        l.learning_type,
        l.created_at.as_deref().unwrap_or("unknown date")
    );
    if let Some(summary) = non_empty(&l.summary) {
        let _ = writeln!(entry, "  {}", summary);
    }
    entry.push('\n');
    entry
}

pub(super) fn experiment(e: &Experiment) -> String {
    let mut entry = format!("- **{}** ({} cycles)\n", e.name, e.cycles_run);
    if let Some(hypothesis) = non_empty(&e.hypothesis) {
        let _ = writeln!(entry, "  Hypothesis: {}", hypothesis);
    }
    entry.push('\n');
    entry
}

pub(super) fn review(r: &PendingReview) -> String {
    let mut entry = format!("- **{}**\n", r.title);
    if let Some(context) = non_empty(&r.context) {
        let _ = writeln!(entry, "  Context: {}", context);
    }
    if let Some(recommendation) = non_empty(&r.recommendation) {
        let _ = writeln!(entry, "  Recommendation: {}", recommendation);
    }
    entry.push('\n');
    entry
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
