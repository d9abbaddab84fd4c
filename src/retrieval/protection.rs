//! Selection of hits exempt from cross-encoder reordering

use crate::identity::{is_apostrophe, strip_possessive};
use crate::query::QueryKind;
use crate::retrieval::RankedHit;
use ahash::{HashSet, HashSetExt};

const PROTECTION_STOP_WORDS: &[&str] = &["what", "is", "the", "a", "an", "of", "for", "to", "s"];

/// Significant lower-case keywords of a query
pub fn significant_keywords(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            let trimmed =
                word.trim_end_matches(|c: char| !c.is_alphanumeric() && !is_apostrophe(c));
            strip_possessive(trimmed)
                .chars()
                .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                .collect::<String>()
        })
        .filter(|word| word.len() >= 2 && !PROTECTION_STOP_WORDS.contains(&word.as_str()))
        .collect()
}

/// Whole words of a text, lower-cased
fn content_words(text: &str) -> HashSet<String> {
    let mut words = HashSet::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        words.insert(word.to_string());
    }
    words
}

/// Indices of hits to protect from reranking
///
/// Semantic queries protect nothing. Factual queries protect, in order,
/// the first `max_protected` hits whose content contains at least one
/// significant query keyword as a whole word.
pub fn find_protected_indices(
    query: &str,
    kind: QueryKind,
    hits: &[RankedHit],
    max_protected: usize,
) -> Vec<usize> {
    if kind == QueryKind::Semantic || max_protected == 0 {
        return Vec::new();
    }

    let keywords = significant_keywords(query);
    if keywords.is_empty() {
        return Vec::new();
    }

    hits.iter()
        .enumerate()
        .filter(|(_, hit)| {
            let words = content_words(hit.content());
            keywords.iter().any(|kw| words.contains(kw))
        })
        .map(|(i, _)| i)
        .take(max_protected)
        .collect()
}
