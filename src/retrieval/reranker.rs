//! Cross-encoder reranking with protected top matches

use crate::retrieval::{sort_by_hybrid_score, RankedHit};
use ahash::{HashSet, HashSetExt};
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Unsupported reranker model: {0}")]
    UnsupportedModel(String),

    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Reranker returned {actual} scores for {expected} documents")]
    ScoreCountMismatch { expected: usize, actual: usize },

    #[error("Reranker lock poisoned")]
    LockPoisoned,
}

/// Joint (query, document) relevance model
pub trait CrossEncoder: Send + Sync {
    /// Score every document against the query, in input order
    fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankError>;

    /// Whether model weights are resident
    fn is_loaded(&self) -> bool {
        true
    }

    /// Load model weights ahead of the first query
    fn load(&self) -> Result<(), RerankError> {
        Ok(())
    }

    fn model_name(&self) -> &str;
}

/// FastEmbed cross-encoder, loaded on first use
///
/// Construction only resolves the model name. Weights are fetched by
/// `load()` or the first `score()` call; both go through the same lock, so
/// concurrent queries wait on a single load and then queue on inference.
pub struct FastEmbedCrossEncoder {
    model_name: String,
    model_kind: RerankerModel,
    model: Mutex<Option<TextRerank>>,
}

impl FastEmbedCrossEncoder {
    /// Create a reranker for the named model without loading it
    ///
    /// # Arguments
    /// * `model_name` - e.g. "BAAI/bge-reranker-base"
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let model_kind = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "rozgo/bge-reranker-v2-m3" | "bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            "jinaai/jina-reranker-v1-turbo-en" | "jina-reranker-v1-turbo-en" => {
                RerankerModel::JINARerankerV1TurboEn
            }
            _ => return Err(RerankError::UnsupportedModel(model_name.to_string())),
        };

        Ok(Self {
            model_name: model_name.to_string(),
            model_kind,
            model: Mutex::new(None),
        })
    }

    fn load_into(&self, slot: &mut Option<TextRerank>) -> Result<(), RerankError> {
        if slot.is_some() {
            return Ok(());
        }

        tracing::info!("Loading cross-encoder model: {}", self.model_name);
        let init_options =
            RerankInitOptions::new(self.model_kind.clone()).with_show_download_progress(false);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;
        tracing::info!("Cross-encoder model loaded");

        *slot = Some(model);
        Ok(())
    }
}

impl CrossEncoder for FastEmbedCrossEncoder {
    fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.model.lock().map_err(|_| RerankError::LockPoisoned)?;
        self.load_into(&mut guard)?;
        let model = guard
            .as_ref()
            .ok_or_else(|| RerankError::InitializationError("model missing after load".into()))?;

        let results = model
            .rerank(query, documents.to_vec(), false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        // FastEmbed returns results sorted by score; put them back in input order
        let mut scores = vec![f32::NEG_INFINITY; documents.len()];
        let mut filled = 0;
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
                filled += 1;
            }
        }
        if filled != documents.len() {
            return Err(RerankError::ScoreCountMismatch {
                expected: documents.len(),
                actual: filled,
            });
        }

        Ok(scores)
    }

    fn is_loaded(&self) -> bool {
        self.model
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn load(&self) -> Result<(), RerankError> {
        let mut guard = self.model.lock().map_err(|_| RerankError::LockPoisoned)?;
        self.load_into(&mut guard)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// How the final order was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "reason", rename_all = "snake_case")]
pub enum RerankMode {
    /// Unprotected hits were ordered by cross-encoder score
    Reranked,
    /// Nothing to reorder, inference skipped
    Skipped,
    /// Protected hits filled every slot
    ProtectedOnly,
    /// Model unavailable or failed; hybrid order kept
    Fallback(String),
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub hits: Vec<RankedHit>,
    pub mode: RerankMode,
}

/// Reorders candidates by direct query–document relevance
///
/// Protected hits keep their relative order at the front and are never
/// scored. The remaining slots are filled by cross-encoder order.
#[derive(Clone, Default)]
pub struct Reranker {
    encoder: Option<Arc<dyn CrossEncoder>>,
}

impl Reranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            encoder: Some(encoder),
        }
    }

    /// A reranker with no model; every call falls back to hybrid order
    pub fn disabled() -> Self {
        Self { encoder: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.encoder.as_ref().is_some_and(|e| e.is_loaded())
    }

    /// Eagerly load the underlying model
    pub fn load(&self) -> Result<(), RerankError> {
        match &self.encoder {
            Some(encoder) => encoder.load(),
            None => Ok(()),
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.encoder.as_deref().map(|e| e.model_name())
    }

    /// Rerank `hits`, returning at most `top_k`
    ///
    /// # Arguments
    /// * `query` - Alias-expanded query
    /// * `hits` - Deduplicated hits in hybrid order
    /// * `top_k` - Number of results to return
    /// * `protected_indices` - Positions in `hits` exempt from reordering
    pub fn rerank(
        &self,
        query: &str,
        hits: Vec<RankedHit>,
        top_k: usize,
        protected_indices: &[usize],
    ) -> RerankOutcome {
        let (protected, mut unprotected) = partition(hits, protected_indices);

        if let Some(outcome) = settle_without_model(&protected, &mut unprotected, top_k) {
            return combine(protected, unprotected, top_k, outcome);
        }

        let Some(encoder) = &self.encoder else {
            return fallback(protected, unprotected, top_k, "no cross-encoder configured");
        };

        let documents: Vec<&str> = unprotected.iter().map(|h| h.content()).collect();
        let scores = match encoder.score(query, &documents) {
            Ok(scores) if scores.len() == unprotected.len() => scores,
            Ok(scores) => {
                let err = RerankError::ScoreCountMismatch {
                    expected: unprotected.len(),
                    actual: scores.len(),
                };
                tracing::warn!("Re-ranking failed, using hybrid scores: {}", err);
                return fallback(protected, unprotected, top_k, &err.to_string());
            }
            Err(e) => {
                tracing::warn!("Re-ranking failed, using hybrid scores: {}", e);
                return fallback(protected, unprotected, top_k, &e.to_string());
            }
        };

        for (hit, score) in unprotected.iter_mut().zip(scores) {
            hit.cross_encoder_score = Some(f64::from(score));
        }
        unprotected.sort_by(|a, b| {
            b.final_score()
                .partial_cmp(&a.final_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            "Reranked {} unprotected results, protected {}",
            unprotected.len(),
            protected.len()
        );

        combine(protected, unprotected, top_k, RerankMode::Reranked)
    }

    /// Order `hits` without a model, as when inference times out
    pub fn fallback_order(
        hits: Vec<RankedHit>,
        top_k: usize,
        protected_indices: &[usize],
        reason: &str,
    ) -> RerankOutcome {
        let (protected, mut unprotected) = partition(hits, protected_indices);
        if let Some(mode) = settle_without_model(&protected, &mut unprotected, top_k) {
            return combine(protected, unprotected, top_k, mode);
        }
        fallback(protected, unprotected, top_k, reason)
    }
}

/// Split into (protected, unprotected), both in input order
fn partition(
    hits: Vec<RankedHit>,
    protected_indices: &[usize],
) -> (Vec<RankedHit>, Vec<RankedHit>) {
    let wanted: HashSet<usize> = protected_indices.iter().copied().collect();
    let mut protected = Vec::with_capacity(wanted.len());
    let mut unprotected = Vec::with_capacity(hits.len());

    for (i, mut hit) in hits.into_iter().enumerate() {
        if wanted.contains(&i) {
            hit.protected = true;
            hit.cross_encoder_score = Some(hit.hybrid_score);
            protected.push(hit);
        } else {
            unprotected.push(hit);
        }
    }

    (protected, unprotected)
}

/// Decide the cases where no inference is needed
fn settle_without_model(
    protected: &[RankedHit],
    unprotected: &mut [RankedHit],
    top_k: usize,
) -> Option<RerankMode> {
    let needed = top_k.saturating_sub(protected.len());

    if unprotected.is_empty() || needed == 0 {
        return Some(RerankMode::ProtectedOnly);
    }

    if unprotected.len() <= needed {
        for hit in unprotected.iter_mut() {
            hit.cross_encoder_score = Some(hit.hybrid_score);
        }
        return Some(RerankMode::Skipped);
    }

    None
}

fn fallback(
    protected: Vec<RankedHit>,
    mut unprotected: Vec<RankedHit>,
    top_k: usize,
    reason: &str,
) -> RerankOutcome {
    for hit in unprotected.iter_mut() {
        hit.cross_encoder_score = Some(hit.hybrid_score);
    }
    sort_by_hybrid_score(&mut unprotected);
    combine(
        protected,
        unprotected,
        top_k,
        RerankMode::Fallback(reason.to_string()),
    )
}

fn combine(
    mut protected: Vec<RankedHit>,
    unprotected: Vec<RankedHit>,
    top_k: usize,
    mode: RerankMode,
) -> RerankOutcome {
    protected.extend(unprotected);
    protected.truncate(top_k);
    RerankOutcome {
        hits: protected,
        mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores documents by their length, counting calls
    struct LengthEncoder {
        calls: AtomicUsize,
    }

    impl CrossEncoder for LengthEncoder {
        fn score(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }

        fn model_name(&self) -> &str {
            "length"
        }
    }

    struct BrokenEncoder;

    impl CrossEncoder for BrokenEncoder {
        fn score(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>, RerankError> {
            Err(RerankError::RerankingError("onnx session crashed".into()))
        }

        fn model_name(&self) -> &str {
            "broken"
        }
    }

    fn hits(contents: &[&str]) -> Vec<RankedHit> {
        contents
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let score = 1.0 - i as f64 * 0.1;
                let mut hit = RankedHit::new(Chunk::new(format!("h{}", i), *text), score);
                hit.hybrid_score = score;
                hit
            })
            .collect()
    }

    fn ids(outcome: &RerankOutcome) -> Vec<&str> {
        outcome.hits.iter().map(|h| h.id()).collect()
    }

    fn length_reranker() -> (Reranker, Arc<LengthEncoder>) {
        let encoder = Arc::new(LengthEncoder {
            calls: AtomicUsize::new(0),
        });
        (Reranker::new(encoder.clone()), encoder)
    }

    #[test]
    fn test_protected_hits_lead_in_original_order() {
        let (reranker, _) = length_reranker();
        let input = hits(&["aaaa", "b", "cc", "dddddddd"]);

        let outcome = reranker.rerank("q", input, 3, &[0, 2]);

        assert_eq!(&ids(&outcome)[..2], &["h0", "h2"]);
        assert!(outcome.hits[0].protected && outcome.hits[1].protected);
        assert_eq!(outcome.hits[0].cross_encoder_score, Some(1.0));
        assert_eq!(ids(&outcome)[2], "h3");
        assert_eq!(outcome.mode, RerankMode::Reranked);
    }

    #[test]
    fn test_unprotected_sorted_by_model_score() {
        let (reranker, encoder) = length_reranker();
        let outcome = reranker.rerank("q", hits(&["a", "abc", "ab"]), 2, &[]);

        assert_eq!(ids(&outcome), vec!["h1", "h2"]);
        assert_eq!(outcome.hits[0].cross_encoder_score, Some(3.0));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_skips_inference_when_everything_fits() {
        let (reranker, encoder) = length_reranker();
        let outcome = reranker.rerank("q", hits(&["a", "abc", "ab"]), 3, &[1]);

        assert_eq!(outcome.mode, RerankMode::Skipped);
        assert_eq!(ids(&outcome), vec!["h1", "h0", "h2"]);
        assert!(outcome
            .hits
            .iter()
            .all(|h| h.cross_encoder_score == Some(h.hybrid_score)));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_protected_fill_all_slots() {
        let (reranker, encoder) = length_reranker();
        let outcome = reranker.rerank("q", hits(&["a", "b", "c", "d"]), 2, &[1, 2, 3]);

        assert_eq!(outcome.mode, RerankMode::ProtectedOnly);
        assert_eq!(ids(&outcome), vec!["h1", "h2"]);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_model_failure_falls_back_to_hybrid_order() {
        let reranker = Reranker::new(Arc::new(BrokenEncoder));
        let outcome = reranker.rerank("q", hits(&["a", "b", "c", "d"]), 2, &[3]);

        assert!(matches!(outcome.mode, RerankMode::Fallback(_)));
        assert_eq!(ids(&outcome), vec!["h3", "h0"]);
    }

    #[test]
    fn test_disabled_reranker_keeps_hybrid_order() {
        let outcome = Reranker::disabled().rerank("q", hits(&["a", "b", "c"]), 2, &[]);
        assert_eq!(ids(&outcome), vec!["h0", "h1"]);
        assert!(!Reranker::disabled().is_loaded());
    }

    #[test]
    fn test_out_of_range_protection_is_ignored() {
        let (reranker, _) = length_reranker();
        let outcome = reranker.rerank("q", hits(&["a", "b"]), 5, &[7]);
        assert_eq!(outcome.hits.len(), 2);
        assert!(outcome.hits.iter().all(|h| !h.protected));
    }

    #[test]
    #[ignore] // Requires model download
    fn test_fastembed_cross_encoder() {
        let encoder = FastEmbedCrossEncoder::new("BAAI/bge-reranker-base").unwrap();
        assert!(!encoder.is_loaded());

        let scores = encoder
            .score(
                "What is the capital of France?",
                &["Paris is the capital of France.", "The weather is nice today."],
            )
            .unwrap();

        assert!(encoder.is_loaded());
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_unknown_model_name() {
        assert!(matches!(
            FastEmbedCrossEncoder::new("made-up/reranker"),
            Err(RerankError::UnsupportedModel(_))
        ));
    }
}
