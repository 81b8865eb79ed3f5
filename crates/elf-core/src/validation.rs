//! Input validation.
//!
//! Pure checks applied to every external input before the store is touched.
//! Each function returns the normalized value or a [`Error::Validation`].

use crate::error::{Error, Result};

pub const MAX_DOMAIN_LENGTH: usize = 100;
pub const MAX_QUERY_LENGTH: usize = 10_000;
pub const MAX_TAG_COUNT: usize = 50;
pub const MAX_TAG_LENGTH: usize = 50;
pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 1000;
pub const MAX_WINDOW_DAYS: u32 = 3650;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

/// Tags may also carry a literal `%` (e.g. `100%cpu`); it is escaped before matching.
fn is_tag_char(c: char) -> bool {
    is_name_char(c) || c == '%'
}

/// Validate a domain name.
///
/// Valid domains are:
/// - 1-100 characters after trimming
/// - ASCII alphanumeric, hyphen, underscore and dot only
pub fn validate_domain(domain: &str) -> Result<String> {
    let domain = domain.trim();

    if domain.is_empty() {
        return Err(Error::validation(
            "Domain cannot be empty. Provide a valid domain name.",
        ));
    }

    if domain.chars().count() > MAX_DOMAIN_LENGTH {
        return Err(Error::validation(format!(
            "Domain exceeds maximum length of {} characters. Use a shorter domain name.",
            MAX_DOMAIN_LENGTH
        )));
    }

    if let Some((i, c)) = domain.chars().enumerate().find(|(_, c)| !is_name_char(*c)) {
        return Err(Error::validation(format!(
            "Domain '{}' contains invalid character '{}' at position {}. \
             Use only alphanumeric, hyphen, underscore, and dot.",
            domain, c, i
        )));
    }

    Ok(domain.to_string())
}

/// Validate a result limit. Accepts a signed value so negative CLI input
/// reaches this check instead of failing inside the argument parser.
pub fn validate_limit(limit: i64) -> Result<usize> {
    if limit < MIN_LIMIT {
        return Err(Error::validation(format!(
            "Limit must be at least {}. Got: {}.",
            MIN_LIMIT, limit
        )));
    }

    if limit > MAX_LIMIT {
        return Err(Error::validation(format!(
            "Limit exceeds maximum of {}. Use a smaller limit or process results in batches.",
            MAX_LIMIT
        )));
    }

    Ok(limit as usize)
}

/// Validate a tag list. Blank entries are dropped; at least one tag must remain.
pub fn validate_tags<S: AsRef<str>>(tags: &[S]) -> Result<Vec<String>> {
    if tags.len() > MAX_TAG_COUNT {
        return Err(Error::validation(format!(
            "Too many tags (max {}). Reduce number of tags or query in batches.",
            MAX_TAG_COUNT
        )));
    }

    let mut validated = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() {
            continue;
        }

        if tag.chars().count() > MAX_TAG_LENGTH {
            let preview: String = tag.chars().take(20).collect();
            return Err(Error::validation(format!(
                "Tag '{}...' exceeds maximum length of {}.",
                preview, MAX_TAG_LENGTH
            )));
        }

        if !tag.chars().all(is_tag_char) {
            return Err(Error::validation(format!(
                "Tag '{}' contains invalid characters. \
                 Use only alphanumeric, hyphen, underscore, dot, and percent.",
                tag
            )));
        }

        validated.push(tag.to_string());
    }

    if validated.is_empty() {
        return Err(Error::validation("No valid tags provided after filtering."));
    }

    Ok(validated)
}

/// Validate free text (task descriptions, type filters).
pub fn validate_text(text: &str) -> Result<String> {
    let text = text.trim();

    if text.is_empty() {
        return Err(Error::validation("Query string cannot be empty."));
    }

    if text.chars().count() > MAX_QUERY_LENGTH {
        return Err(Error::validation(format!(
            "Query exceeds maximum length of {} characters. Reduce query size.",
            MAX_QUERY_LENGTH
        )));
    }

    Ok(text.to_string())
}

/// Validate a token budget, capping it at `cap`.
pub fn validate_max_tokens(max_tokens: i64, cap: usize) -> Result<usize> {
    if max_tokens < 1 {
        return Err(Error::validation(format!(
            "max_tokens must be positive. Got: {}.",
            max_tokens
        )));
    }
    Ok((max_tokens as u64).min(cap as u64) as usize)
}

/// Validate a trailing window in days.
pub fn validate_days(days: u32) -> Result<u32> {
    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(Error::validation(format!(
            "Day window must be between 1 and {}. Got: {}.",
            MAX_WINDOW_DAYS, days
        )));
    }
    Ok(days)
}

/// Validate a similarity threshold.
pub fn validate_threshold(threshold: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::validation(format!(
            "Similarity threshold must be between 0 and 1. Got: {}.",
            threshold
        )));
    }
    Ok(threshold)
}

/// Split a comma-separated tag argument.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',').map(|t| t.trim().to_string()).collect()
}
