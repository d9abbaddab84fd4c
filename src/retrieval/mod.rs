//! Hybrid retrieval and ranking
//!
//! Keyword and vector search run side by side, are merged with Reciprocal
//! Rank Fusion, boosted for recency and named identities, collapsed over
//! overlapping chunks, and finally reordered by a cross-encoder that leaves
//! protected exact matches in place.

mod boost;
mod chunk;
mod context;
mod deduplication;
mod fusion;
mod health;
mod hybrid;
mod protection;
mod reranker;
mod source;

pub use boost::{
    apply_boosts, days_old, parse_modified_date, recency_boost, sort_by_hybrid_score, BoostConfig,
};
pub use chunk::{Chunk, RankedHit, SUMMARY_CHUNK_INDEX};
pub use context::{open_reranker, open_vector_index, RetrievalContext};
pub use deduplication::deduplicate_overlapping;
pub use fusion::{reciprocal_rank_fusion, FusedId, FusionConfig, FusionError, DEFAULT_RRF_K};
pub use health::{DegradationEvent, DegradationLog};
pub use hybrid::HybridSearcher;
pub use protection::{find_protected_indices, significant_keywords};
pub use reranker::{
    CrossEncoder, FastEmbedCrossEncoder, RerankError, RerankMode, RerankOutcome, Reranker,
};
pub use source::{
    RetrievalSource, Signal, SourceError, SourceHit, UnavailableSource, VectorSource,
};

use crate::query::QueryContext;
use serde::Serialize;

/// Default number of results returned
pub const DEFAULT_TOP_K: usize = 20;

/// One call to `HybridSearcher::search`
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub apply_recency_boost: bool,
    /// `None` uses the configured default
    pub use_reranker: Option<bool>,
    /// `None` uses the configured default
    pub rerank_candidates: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            apply_recency_boost: true,
            use_reranker: None,
            rerank_candidates: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_recency_boost(mut self, enabled: bool) -> Self {
        self.apply_recency_boost = enabled;
        self
    }

    pub fn with_reranker(mut self, enabled: bool) -> Self {
        self.use_reranker = Some(enabled);
        self
    }

    pub fn without_reranker(self) -> Self {
        self.with_reranker(false)
    }

    pub fn with_rerank_candidates(mut self, candidates: usize) -> Self {
        self.rerank_candidates = Some(candidates);
        self
    }
}

/// Outcome of a search with respect to its two signals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchStatus {
    /// Both signals answered
    Ok,
    /// One signal was lost; results come from the other
    Degraded { signal: Signal, reason: String },
    /// Both signals answered and nothing matched
    Empty,
    /// Neither signal answered
    NoSignal { keyword: String, vector: String },
}

impl SearchStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SearchStatus::Degraded { .. } | SearchStatus::NoSignal { .. })
    }
}

/// Ranked hits plus how they were produced
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: QueryContext,
    pub hits: Vec<RankedHit>,
    pub status: SearchStatus,
    /// Set when the reranker stage ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank: Option<RerankMode>,
}

impl SearchResponse {
    pub fn empty(query: QueryContext) -> Self {
        Self {
            query,
            hits: Vec::new(),
            status: SearchStatus::Empty,
            rerank: None,
        }
    }
}
