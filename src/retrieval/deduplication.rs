//! Overlapping-chunk deduplication

use crate::retrieval::RankedHit;
use ahash::{HashMap, HashMapExt, HashSet};

/// Drop chunks that overlap an already seen neighbour from the same file
///
/// Input must be sorted by score descending, so the best member of each run
/// of adjacent chunks (index within ±1) survives. A dropped chunk still marks
/// its index as seen, so a whole run collapses to one hit. Hits without a
/// resolvable file path or chunk index are always kept.
///
/// # Arguments
/// * `hits` - Ranked hits, highest score first
///
/// # Returns
/// Deduplicated hits, maintaining score order
pub fn deduplicate_overlapping(hits: Vec<RankedHit>) -> Vec<RankedHit> {
    let mut seen_by_file: HashMap<String, HashSet<i64>> = HashMap::new();
    let mut kept = Vec::with_capacity(hits.len());

    for hit in hits {
        let (Some(path), Some(index)) = (hit.chunk.source_path(), hit.chunk.resolved_chunk_index())
        else {
            kept.push(hit);
            continue;
        };

        let seen = seen_by_file.entry(path.to_string()).or_default();
        let overlaps = [index - 1, index, index + 1]
            .iter()
            .any(|neighbour| seen.contains(neighbour));
        seen.insert(index);

        if overlaps {
            tracing::debug!("Dropping overlapping chunk {}", hit.chunk.id);
            continue;
        }

        kept.push(hit);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Chunk;

    fn hit(path: &str, index: i64, score: f64) -> RankedHit {
        let mut hit = RankedHit::new(Chunk::for_file(path, index, "text"), score);
        hit.hybrid_score = score;
        hit
    }

    #[test]
    fn test_adjacent_chunks_collapse() {
        let hits = vec![
            hit("/a.md", 1, 0.9),
            hit("/a.md", 0, 0.8),
            hit("/a.md", 2, 0.7),
            hit("/a.md", 5, 0.6),
        ];

        let kept: Vec<i64> = deduplicate_overlapping(hits)
            .iter()
            .filter_map(|h| h.chunk.chunk_index)
            .collect();
        assert_eq!(kept, vec![1, 5]);
    }

    #[test]
    fn test_run_collapses_to_best_member() {
        let hits = vec![
            hit("/a.md", 0, 0.9),
            hit("/a.md", 1, 0.8),
            hit("/a.md", 2, 0.7),
            hit("/a.md", 5, 0.6),
        ];

        let kept: Vec<i64> = deduplicate_overlapping(hits)
            .iter()
            .filter_map(|h| h.chunk.chunk_index)
            .collect();
        assert_eq!(kept, vec![0, 5]);
    }

    #[test]
    fn test_other_files_are_independent() {
        let hits = vec![hit("/a.md", 3, 0.9), hit("/b.md", 3, 0.8), hit("/b.md", 4, 0.7)];
        assert_eq!(deduplicate_overlapping(hits).len(), 2);
    }

    #[test]
    fn test_unresolvable_hits_are_kept() {
        let mut orphan = RankedHit::new(Chunk::new("orphan", "x"), 0.5);
        orphan.hybrid_score = 0.5;
        let summary = RankedHit::new(Chunk::new(Chunk::summary_id("/a.md"), "x"), 0.4);

        let hits = vec![hit("/a.md", 0, 0.9), orphan, summary.clone(), summary];
        assert_eq!(deduplicate_overlapping(hits).len(), 4);
    }
}
