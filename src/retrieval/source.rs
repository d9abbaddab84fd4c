//! The two retrieval signals behind a common trait

use crate::embedding::{
    EmbeddingError, EmbeddingProvider, KeywordIndex, KeywordIndexError, VectorIndex,
    VectorIndexError,
};
use crate::retrieval::Chunk;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Which sub-search produced a ranked list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Keyword,
    Vector,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Keyword => write!(f, "keyword"),
            Signal::Vector => write!(f, "vector"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Keyword search failed: {0}")]
    Keyword(#[from] KeywordIndexError),

    #[error("Vector search failed: {0}")]
    Vector(#[from] VectorIndexError),

    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// A chunk returned by one sub-search with that engine's own score
#[derive(Debug, Clone)]
pub struct SourceHit {
    pub chunk: Chunk,
    /// Engine-specific relevance, higher is better; only the order is used
    pub score: f64,
}

/// A ranked retrieval signal
///
/// Implementations are blocking and are driven from the blocking pool.
pub trait RetrievalSource: Send + Sync {
    fn signal(&self) -> Signal;

    /// Up to `k` hits, best first
    fn search(&self, query: &str, k: usize) -> Result<Vec<SourceHit>, SourceError>;
}

impl RetrievalSource for KeywordIndex {
    fn signal(&self) -> Signal {
        Signal::Keyword
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<SourceHit>, SourceError> {
        Ok(KeywordIndex::search(self, query, k)?
            .into_iter()
            .map(|result| SourceHit {
                chunk: result.chunk,
                score: f64::from(result.score),
            })
            .collect())
    }
}

/// Semantic search: embed the query, then look up nearest chunks
pub struct VectorSource {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    ef_search: usize,
}

impl VectorSource {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        ef_search: usize,
    ) -> Self {
        Self {
            provider,
            index,
            ef_search,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}

impl RetrievalSource for VectorSource {
    fn signal(&self) -> Signal {
        Signal::Vector
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<SourceHit>, SourceError> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.provider.embed(query)?;
        Ok(self
            .index
            .search(&embedding, k, self.ef_search)?
            .into_iter()
            .map(|result| SourceHit {
                chunk: result.chunk,
                score: f64::from(result.score),
            })
            .collect())
    }
}

/// A signal that always fails, standing in for an index that could not open
pub struct UnavailableSource {
    signal: Signal,
    reason: String,
}

impl UnavailableSource {
    pub fn new(signal: Signal, reason: impl Into<String>) -> Self {
        Self {
            signal,
            reason: reason.into(),
        }
    }
}

impl RetrievalSource for UnavailableSource {
    fn signal(&self) -> Signal {
        self.signal
    }

    fn search(&self, _query: &str, _k: usize) -> Result<Vec<SourceHit>, SourceError> {
        Err(SourceError::Unavailable(self.reason.clone()))
    }
}
