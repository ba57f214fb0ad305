//! Keyword-overlap relevance between a new query and a cached one.
//!
//! Scoring: exact token match +2, partial (substring either direction) +1. Stop-words
//! and one-character fragments are dropped before scoring.

use std::collections::HashSet;

use once_cell::sync::Lazy;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "get", "find", "show", "list", "create", "update", "delete", "the", "a", "an", "and",
        "or", "with", "for", "of", "in", "on", "at", "to", "from",
    ]
    .into_iter()
    .collect()
});

/// Lowercases and collapses whitespace; used for cache keys.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokens that carry meaning: lowercased, alphanumeric runs, stop-words stripped.
pub fn meaningful_tokens(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(t.as_str()))
        .collect()
}

/// Overlap score between token lists: +2 per exact match, +1 per partial match.
pub fn overlap_score(new_tokens: &[String], cached_tokens: &[String]) -> u32 {
    let mut score = 0;
    for token in new_tokens {
        if cached_tokens.iter().any(|c| c == token) {
            score += 2;
        } else if cached_tokens
            .iter()
            .any(|c| c.contains(token.as_str()) || token.contains(c.as_str()))
        {
            score += 1;
        }
    }
    score
}
