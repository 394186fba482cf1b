//! Keyword-overlap relevance scoring.

use std::collections::HashSet;

use knowledge_types::{tokenize, MemoryItem};
use serde::Serialize;

/// A memory item with its relevance to a query, in (0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub item: MemoryItem,
    pub relevance: f64,
}

/// Overlap between query tokens and an item's content and keywords.
///
/// Each distinct query token adds 1 when it appears in the content and 0.5
/// when it appears among the keywords. The sum is divided by the number of
/// distinct query tokens and capped at 1. A query with no tokens scores 0.
pub fn keyword_similarity(query: &str, content: &str, keywords: &[String]) -> f64 {
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens: HashSet<String> = tokenize(content).into_iter().collect();
    let keyword_tokens: HashSet<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    let matches: f64 = query_tokens
        .iter()
        .map(|token| {
            let mut hit = 0.0;
            if content_tokens.contains(token) {
                hit += 1.0;
            }
            if keyword_tokens.contains(token) {
                hit += 0.5;
            }
            hit
        })
        .sum();

    (matches / query_tokens.len() as f64).min(1.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rank memory items against `query`.
///
/// Items of another type are skipped when `type_filter` is set. Relevance is
/// rounded to two decimals; zero-relevance items are dropped. Ties keep input
/// order.
pub fn score(
    query: &str,
    items: &[MemoryItem],
    limit: usize,
    type_filter: Option<&str>,
) -> Vec<ScoredMemory> {
    let mut scored: Vec<ScoredMemory> = items
        .iter()
        .filter(|item| type_filter.map_or(true, |t| item.memory_type == t))
        .filter_map(|item| {
            let keywords = if item.keywords.is_empty() {
                &item.tags
            } else {
                &item.keywords
            };
            let relevance = round2(keyword_similarity(query, &item.content, keywords));
            (relevance > 0.0).then(|| ScoredMemory {
                item: item.clone(),
                relevance,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    scored.truncate(limit);
    scored
}
