//! Accountability banner for golden-rule violations.

use colored::{ColoredString, Colorize};
use elf_core::ViolationSummary;

const WIDTH: usize = 71;
const TOP_RULES: usize = 5;
const RECENT_SHOWN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Normal,
    Warning,
    Probation,
    Critical,
}

impl Level {
    pub fn for_total(total: i64) -> Self {
        match total {
            t if t >= 10 => Level::Critical,
            t if t >= 5 => Level::Probation,
            t if t >= 3 => Level::Warning,
            _ => Level::Normal,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Level::Normal => "NORMAL",
            Level::Warning => "WARNING",
            Level::Probation => "PROBATION",
            Level::Critical => "CRITICAL",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Level::Normal => "Acceptable compliance level",
            Level::Warning => "Review adherence to rules",
            Level::Probation => "INCREASED SCRUTINY MODE",
            Level::Critical => "CEO ESCALATION REQUIRED",
        }
    }

    fn consequence(&self) -> &'static str {
        match self {
            Level::Normal => "OK  STATUS: Acceptable compliance. Keep up good practices.",
            Level::Warning => "!!  CONSEQUENCES: Warning threshold - 2 more violations = probation",
            Level::Probation => "!!  CONSEQUENCES: Under probation - violations logged prominently",
            Level::Critical => "!!  CONSEQUENCES: CEO escalation required",
        }
    }

    fn paint(&self, line: &str) -> ColoredString {
        match self {
            Level::Normal => line.green(),
            Level::Warning | Level::Probation => line.yellow(),
            Level::Critical => line.red().bold(),
        }
    }
}

/// Plain banner lines, box-drawn at a fixed width.
pub fn render(summary: &ViolationSummary) -> Vec<String> {
    let level = Level::for_total(summary.total);
    let mut lines = vec![
        border('╔', '╗'),
        centered("ACCOUNTABILITY TRACKING SYSTEM"),
        centered("Golden Rule Violation Report"),
        border('╠', '╣'),
        row(&format!("Period: Last {} days", summary.days)),
        row(&format!("Total Violations: {}", summary.total)),
        row(&format!("Status: {}", level.label())),
        row(level.message()),
        border('╠', '╣'),
    ];

    if !summary.by_rule.is_empty() {
        lines.push(row("Violations by Rule:"));
        for rule in summary.by_rule.iter().take(TOP_RULES) {
            lines.push(row(&format!(
                "  Rule #{}: {:<35} ({:>2}x)",
                rule.rule_id,
                truncate(&rule.rule_name, 35),
                rule.count
            )));
        }
        if summary.by_rule.len() > TOP_RULES {
            lines.push(row(&format!("  ... and {} more", summary.by_rule.len() - TOP_RULES)));
        }
        lines.push(border('╠', '╣'));
    }

    if !summary.recent.is_empty() {
        lines.push(row("Recent Violations:"));
        for v in summary.recent.iter().take(RECENT_SHOWN) {
            let date = v
                .violation_date
                .as_deref()
                .map(|d| truncate(d, 16))
                .unwrap_or_else(|| "Unknown".to_string());
            let description = v
                .description
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(|d| truncate(d, 45))
                .unwrap_or_else(|| "No description".to_string());
            lines.push(row(&format!("  [{}] Rule #{}", date, v.rule_id)));
            lines.push(row(&format!("    {}", description)));
        }
        lines.push(border('╠', '╣'));
    }

    lines.push(row(level.consequence()));
    lines.push(border('╚', '╝'));
    lines
}

pub fn print(summary: &ViolationSummary) {
    let level = Level::for_total(summary.total);
    for line in render(summary) {
        println!("{}", level.paint(&line));
    }
}

fn border(left: char, right: char) -> String {
    format!("{}{}{}", left, "═".repeat(WIDTH), right)
}

fn row(text: &str) -> String {
    let text = truncate(text, WIDTH - 2);
    let pad = WIDTH - 2 - text.chars().count();
    format!("║  {}{}║", text, " ".repeat(pad))
}

fn centered(text: &str) -> String {
    let len = text.chars().count();
    let left = (WIDTH - len) / 2;
    let right = WIDTH - len - left;
    format!("║{}{}{}║", " ".repeat(left), text, " ".repeat(right))
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
