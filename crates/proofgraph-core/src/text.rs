//! Lightweight text analysis shared by the grouping engine (similarity) and
//! the critic (vocabulary coverage). Deliberately simple: deterministic,
//! dependency-free, and tuned for mathematical prose rather than general NLP.

use std::collections::BTreeSet;

const STOP_WORDS: &[&str] = &[
    "all", "and", "any", "are", "but", "can", "each", "every", "for", "from", "has", "have", "her",
    "his", "how", "into", "its", "not", "one", "only", "our", "out", "over", "she", "some", "such",
    "than", "that", "the", "their", "then", "there", "these", "they", "this", "those", "thus",
    "under", "was", "were", "when", "where", "which", "while", "with", "you",
];

/// Light suffix-stripping stemmer. Enough to make "composes"/"composing"
/// match "compose" without pulling in a full stemming crate.
pub fn stem(token: &str) -> String {
    let suffixes = ["ingly", "edly", "ing", "ed", "ies", "es", "ly", "s"];
    for suffix in suffixes {
        if let Some(base) = token.strip_suffix(suffix) {
            if base.len() >= 3 {
                return base.to_string();
            }
        }
    }
    token.to_string()
}

/// Stemmed, stop-word-filtered content tokens (3+ characters, lowercase).
pub fn content_tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 3 && !STOP_WORDS.contains(&t.as_str()))
        .map(|t| stem(&t))
        .collect()
}

/// Jaccard similarity between two token sets. Empty sets are 0.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}
