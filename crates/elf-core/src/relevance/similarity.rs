//! Keyword-overlap matching of a task against past failures.

use std::collections::BTreeSet;

use crate::db::types::{Learning, SimilarFailure};

/// Words this short or shorter are ignored.
const MIN_WORD_CHARS: usize = 4;
const MAX_MATCHED_KEYWORDS: usize = 5;

/// Lowercased word tokens longer than three characters.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| word.chars().count() >= MIN_WORD_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// `|a ∩ b| / |a ∪ b|`, zero when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Rank failures by overlap with `task`, keeping those at or above
/// `threshold`, best first. Candidates are expected newest first; ties keep
/// that order.
pub fn find_similar(
    task: &str,
    candidates: Vec<Learning>,
    threshold: f64,
    limit: usize,
) -> Vec<SimilarFailure> {
    let task_words = tokenize(task);
    if task_words.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<SimilarFailure> = candidates
        .into_iter()
        .filter(|l| l.is_failure())
        .filter_map(|learning| {
            let text = format!("{} {}", learning.title, learning.summary.as_deref().unwrap_or(""));
            let words = tokenize(&text);
            let similarity = jaccard(&task_words, &words);
            if similarity < threshold || similarity == 0.0 {
                return None;
            }
            let matched_keywords = task_words
                .intersection(&words)
                .take(MAX_MATCHED_KEYWORDS)
                .cloned()
                .collect();
            Some(SimilarFailure {
                learning,
                similarity,
                matched_keywords,
            })
        })
        .collect();

    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches.truncate(limit);
    matches
}
