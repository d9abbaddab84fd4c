//! Reciprocal Rank Fusion algorithm for combining search results

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use thiserror::Error;

/// Literature-standard RRF constant
pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid RRF constant {0}: must be finite and non-negative")]
    InvalidK(f64),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f64,
}

impl FusionConfig {
    pub fn new(rrf_k: f64) -> Result<Self, FusionError> {
        if !rrf_k.is_finite() || rrf_k < 0.0 {
            return Err(FusionError::InvalidK(rrf_k));
        }
        Ok(Self { rrf_k })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

/// One fused candidate
#[derive(Debug, Clone, PartialEq)]
pub struct FusedId {
    pub id: String,
    pub score: f64,
    /// Zero-based best rank in the vector list
    pub vector_rank: Option<usize>,
    /// Zero-based best rank in the keyword list
    pub keyword_rank: Option<usize>,
}

/// Apply Reciprocal Rank Fusion to combine two ranked id lists
///
/// RRF formula: score(id) = sum over lists containing id of 1 / (k + rank + 1)
///
/// Only rank positions contribute, so the two engines' score scales never
/// matter. An id repeated within one list counts once, at its best rank.
/// Equal scores keep first-seen order with the vector list walked first,
/// which makes the output deterministic.
///
/// # Returns
/// Every id from either list, sorted by fused score descending
pub fn reciprocal_rank_fusion<V, K>(
    vector_ids: &[V],
    keyword_ids: &[K],
    config: &FusionConfig,
) -> Vec<FusedId>
where
    V: AsRef<str>,
    K: AsRef<str>,
{
    let mut fused: Vec<FusedId> = Vec::with_capacity(vector_ids.len() + keyword_ids.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    let mut accumulate = |id: &str, rank: usize, is_vector: bool| {
        let contribution = 1.0 / (config.rrf_k + rank as f64 + 1.0);
        let slot = *positions.entry(id.to_string()).or_insert_with(|| {
            fused.push(FusedId {
                id: id.to_string(),
                score: 0.0,
                vector_rank: None,
                keyword_rank: None,
            });
            fused.len() - 1
        });

        let entry = &mut fused[slot];
        entry.score += contribution;
        if is_vector {
            entry.vector_rank = Some(rank);
        } else {
            entry.keyword_rank = Some(rank);
        }
    };

    let mut seen: HashSet<&str> = HashSet::new();
    for (rank, id) in vector_ids.iter().enumerate() {
        if seen.insert(id.as_ref()) {
            accumulate(id.as_ref(), rank, true);
        }
    }

    seen.clear();
    for (rank, id) in keyword_ids.iter().enumerate() {
        if seen.insert(id.as_ref()) {
            accumulate(id.as_ref(), rank, false);
        }
    }

    // Stable sort: ties stay in first-seen order
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(fused: &[FusedId]) -> Vec<&str> {
        fused.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn test_rrf_basic() {
        let vector = ["c1", "c2", "c3"];
        let keyword = ["c2", "c1", "c4"];

        let fused = reciprocal_rank_fusion(&vector, &keyword, &FusionConfig::default());

        // Consensus ids first, single-signal ids after
        assert_eq!(ids(&fused), vec!["c1", "c2", "c3", "c4"]);
        assert_eq!(fused[0].vector_rank, Some(0));
        assert_eq!(fused[0].keyword_rank, Some(1));
        assert_eq!(fused[3].vector_rank, None);
    }

    #[test]
    fn test_rrf_symmetry() {
        let fused = reciprocal_rank_fusion(&["a", "b"], &["b", "a"], &FusionConfig::default());
        assert!((fused[0].score - fused[1].score).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_completeness() {
        let fused = reciprocal_rank_fusion(&["a", "b"], &["c"], &FusionConfig::default());
        let mut got = ids(&fused);
        got.sort();
        assert_eq!(got, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicates_count_once_at_best_rank() {
        let config = FusionConfig::new(60.0).unwrap();
        let fused = reciprocal_rank_fusion(&["a", "a", "b"], &[] as &[&str], &config);

        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 63.0).abs() < 1e-12);
        assert_eq!(fused[0].vector_rank, Some(0));
    }

    #[test]
    fn test_score_ignores_magnitudes() {
        let config = FusionConfig::new(0.0).unwrap();
        let fused = reciprocal_rank_fusion(&["x"], &["x"], &config);
        assert!((fused[0].score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_k() {
        assert!(FusionConfig::new(-1.0).is_err());
        assert!(FusionConfig::new(f64::NAN).is_err());
    }
}
