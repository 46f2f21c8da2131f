//! Local heuristic analysis used when every provider fails.
//!
//! Keyword frequency and a leading-text summary, no model call. The
//! result is flagged `degraded = true` and is a success as far as
//! callers are concerned.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{AnalysisKind, AnalysisResult};

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "that", "with", "this", "from", "have", "are", "was", "were", "will",
    "been", "their", "them", "they", "there", "which", "would", "could", "should", "about", "into",
    "over", "under", "after", "before", "between", "because", "while", "where", "when", "what",
    "than", "then", "these", "those", "such", "each", "other", "some", "more", "most", "only",
    "also", "very", "just", "being", "does", "doing",
];

const MAX_KEYWORDS: usize = 10;
const SUMMARY_WORDS: usize = 100;

/// Produce a degraded analysis from word statistics alone.
pub fn analyze(content: &str, kind: AnalysisKind) -> AnalysisResult {
    warn!("all providers failed; producing degraded {} analysis", kind);

    let words: Vec<&str> = content.split_whitespace().collect();

    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in &words {
        let cleaned = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if cleaned.len() > 3 && !STOP_WORDS.contains(&cleaned.as_str()) {
            *freq.entry(cleaned).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    // Sort by frequency, then alphabetically for a stable order.
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let keywords: Vec<String> = ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _)| word)
        .collect();

    let mut summary: String = words
        .iter()
        .take(SUMMARY_WORDS)
        .copied()
        .collect::<Vec<&str>>()
        .join(" ");
    if words.len() > SUMMARY_WORDS {
        summary.push_str("...");
    }

    AnalysisResult {
        summary,
        keywords,
        degraded: true,
        ..Default::default()
    }
}
