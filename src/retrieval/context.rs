//! Shared resources a searcher is built from

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{
    model_dimension, EmbeddingProvider, FastEmbedProvider, HnswParams, KeywordIndex, VectorIndex,
};
use crate::error::{RecollectError, Result};
use crate::identity::AliasTable;
use crate::retrieval::{
    FastEmbedCrossEncoder, Reranker, RetrievalSource, Signal, UnavailableSource, VectorSource,
};
use std::sync::Arc;

/// Indices, alias table and reranker, opened once per process
///
/// Everything is reference counted so one context can back several
/// searchers and the batch indexer at the same time.
#[derive(Clone)]
pub struct RetrievalContext {
    pub keyword: Arc<dyn RetrievalSource>,
    pub vector: Arc<dyn RetrievalSource>,
    pub aliases: Arc<AliasTable>,
    pub reranker: Arc<Reranker>,
}

impl RetrievalContext {
    pub fn new(
        keyword: Arc<dyn RetrievalSource>,
        vector: Arc<dyn RetrievalSource>,
        aliases: Arc<AliasTable>,
        reranker: Arc<Reranker>,
    ) -> Self {
        Self {
            keyword,
            vector,
            aliases,
            reranker,
        }
    }

    /// Open every resource named by `config`
    ///
    /// A keyword index or embedding model that cannot be opened is replaced
    /// by an unavailable source, so search still runs on the other signal.
    /// The cross-encoder is only resolved here; weights load on first use.
    pub fn open(config: &Config) -> Result<Self> {
        let aliases = Arc::new(AliasTable::load(&config.identity.people_file)?);
        tracing::info!("Loaded {} identity aliases", aliases.len());

        let keyword: Arc<dyn RetrievalSource> =
            match KeywordIndex::new(config.storage.keyword_index_dir()) {
                Ok(index) => Arc::new(index),
                Err(e) => {
                    tracing::warn!("Keyword index unavailable: {}", e);
                    Arc::new(UnavailableSource::new(Signal::Keyword, e.to_string()))
                }
            };

        let vector: Arc<dyn RetrievalSource> = match Self::open_vector(config) {
            Ok(source) => Arc::new(source),
            Err(e) => {
                tracing::warn!("Vector search unavailable: {}", e);
                Arc::new(UnavailableSource::new(Signal::Vector, e.to_string()))
            }
        };

        let reranker = open_reranker(&config.retrieval);

        Ok(Self::new(keyword, vector, aliases, Arc::new(reranker)))
    }

    fn open_vector(config: &Config) -> Result<VectorSource> {
        let index = Arc::new(open_vector_index(config)?);
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
        Ok(VectorSource::new(
            provider,
            index,
            config.indexing.hnsw_ef_search,
        ))
    }
}

/// Resolve the configured cross-encoder without loading its weights
///
/// The model is resolved even when `reranker_enabled` is false, since that
/// flag is only the per-request default. An unsupported model name gives a
/// reranker with no model, so requests fall back to hybrid order.
pub fn open_reranker(config: &RetrievalConfig) -> Reranker {
    match FastEmbedCrossEncoder::new(&config.reranker_model) {
        Ok(encoder) => Reranker::new(Arc::new(encoder)),
        Err(e) => {
            tracing::warn!(
                model = %config.reranker_model,
                reason = %e,
                "Cross-encoder unavailable, results keep hybrid order"
            );
            Reranker::disabled()
        }
    }
}

/// Open the vector index at its configured location
pub fn open_vector_index(config: &Config) -> Result<VectorIndex> {
    if let Some(expected) = model_dimension(&config.embedding.model) {
        if expected != config.indexing.vector_dim {
            return Err(RecollectError::InvalidConfigValue {
                path: "indexing.vector_dim".to_string(),
                message: format!(
                    "{} produces {}-dimensional vectors, configured {}",
                    config.embedding.model, expected, config.indexing.vector_dim
                ),
            });
        }
    }

    let params = HnswParams {
        dimension: config.indexing.vector_dim,
        ef_construction: config.indexing.hnsw_ef_construction,
        m: config.indexing.hnsw_m,
    };
    Ok(VectorIndex::open(
        params,
        config.storage.vector_index_path(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Chunk, RankedHit, RerankMode};

    #[test]
    fn test_reranker_resolved_when_disabled_by_default() {
        let config = RetrievalConfig {
            reranker_enabled: false,
            ..RetrievalConfig::default()
        };

        let reranker = open_reranker(&config);
        assert_eq!(reranker.model_name(), Some("BAAI/bge-reranker-base"));
        assert!(!reranker.is_loaded());
    }

    #[test]
    fn test_unsupported_reranker_model_degrades() {
        let config = RetrievalConfig {
            reranker_model: "cross-encoder/ms-marco-MiniLM-L6-v2".to_string(),
            ..RetrievalConfig::default()
        };

        let reranker = open_reranker(&config);
        assert_eq!(reranker.model_name(), None);

        let hits: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|id| RankedHit::new(Chunk::new(*id, *id), 0.1))
            .collect();
        let outcome = reranker.rerank("query", hits, 2, &[]);
        assert!(matches!(outcome.mode, RerankMode::Fallback(_)));
        assert_eq!(outcome.hits.len(), 2);
    }
}
