//! Hybrid search combining semantic and keyword search

use crate::config::RetrievalConfig;
use crate::error::{RecollectError, Result};
use crate::query::{identity_tokens, QueryClassifier, QueryContext, QueryPreprocessor};
use crate::retrieval::{
    apply_boosts, deduplicate_overlapping, find_protected_indices, reciprocal_rank_fusion,
    sort_by_hybrid_score, BoostConfig, Chunk, DegradationEvent, DegradationLog, FusionConfig,
    RankedHit, RerankMode, RerankOutcome, Reranker, RetrievalContext, RetrievalSource,
    SearchRequest, SearchResponse, SearchStatus, Signal, SourceHit,
};
use ahash::{HashMap, HashMapExt};
use chrono::{Local, NaiveDate};
use std::sync::Arc;

/// Hybrid searcher combining semantic and keyword search
///
/// Holds no per-query state, so one instance serves concurrent searches.
pub struct HybridSearcher {
    context: RetrievalContext,
    config: RetrievalConfig,
    preprocessor: QueryPreprocessor,
    classifier: QueryClassifier,
    fusion: FusionConfig,
    boosts: BoostConfig,
    degradations: Arc<DegradationLog>,
    reference_date: Option<NaiveDate>,
}

impl HybridSearcher {
    /// Create a new hybrid searcher
    pub fn new(context: RetrievalContext, config: RetrievalConfig) -> Result<Self> {
        let fusion =
            FusionConfig::new(config.rrf_k).map_err(|e| RecollectError::InvalidConfigValue {
                path: "retrieval.rrf_k".to_string(),
                message: e.to_string(),
            })?;

        let boosts = BoostConfig {
            max_recency_boost: config.max_recency_boost,
            horizon_days: config.recency_horizon_days,
            filename_boost: config.filename_boost,
        };

        Ok(Self {
            preprocessor: QueryPreprocessor::new(context.aliases.clone()),
            classifier: QueryClassifier::new(context.aliases.clone())?,
            context,
            config,
            fusion,
            boosts,
            degradations: Arc::new(DegradationLog::new()),
            reference_date: None,
        })
    }

    /// Compute recency against a fixed date instead of today
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn reranker(&self) -> &Reranker {
        &self.context.reranker
    }

    /// Expand aliases and classify, without searching
    pub fn analyze(&self, query: &str) -> QueryContext {
        let expanded = self.preprocessor.expand(query);
        let kind = self.classifier.classify(&expanded);
        QueryContext {
            raw: query.to_string(),
            expanded,
            kind,
        }
    }

    /// Fallbacks taken within the last day
    pub fn degradation_events(&self) -> Vec<DegradationEvent> {
        self.degradations.recent(24)
    }

    /// Perform hybrid search
    ///
    /// Never fails: a lost signal, an unparseable keyword query or a broken
    /// reranker are reported through `SearchResponse::status` and the
    /// degradation log instead.
    pub async fn search(&self, request: &SearchRequest) -> SearchResponse {
        let query = self.analyze(&request.query);
        tracing::debug!(
            "Query '{}' expanded to '{}' ({})",
            query.raw,
            query.expanded,
            query.kind
        );

        if query.expanded.trim().is_empty() || request.top_k == 0 {
            return SearchResponse::empty(query);
        }

        let use_reranker = request
            .use_reranker
            .unwrap_or(self.config.reranker_enabled);
        let fetch_k = if use_reranker {
            request
                .rerank_candidates
                .unwrap_or(self.config.rerank_candidates)
                .max(request.top_k)
        } else {
            request.top_k
        };

        // Step 1: Parallel keyword + semantic search
        let (keyword_results, vector_results) = tokio::join!(
            self.run_source(self.context.keyword.clone(), &query.expanded, fetch_k),
            self.run_source(self.context.vector.clone(), &query.expanded, fetch_k)
        );

        let (keyword_hits, vector_hits, status) = match (keyword_results, vector_results) {
            (Ok(keyword), Ok(vector)) => (keyword, vector, SearchStatus::Ok),
            (Err(keyword), Err(vector)) => {
                self.degradations.record("keyword", "none", &keyword);
                self.degradations.record("vector", "none", &vector);
                return SearchResponse {
                    query,
                    hits: Vec::new(),
                    status: SearchStatus::NoSignal { keyword, vector },
                    rerank: None,
                };
            }
            (Err(reason), Ok(vector)) => {
                self.degradations.record("keyword", "vector_only", &reason);
                let status = SearchStatus::Degraded {
                    signal: Signal::Keyword,
                    reason,
                };
                (Vec::new(), vector, status)
            }
            (Ok(keyword), Err(reason)) => {
                self.degradations.record("vector", "keyword_only", &reason);
                let status = SearchStatus::Degraded {
                    signal: Signal::Vector,
                    reason,
                };
                (keyword, Vec::new(), status)
            }
        };

        // Step 2: Reciprocal Rank Fusion
        let mut candidates = self.fuse(keyword_hits, vector_hits, fetch_k);
        if candidates.is_empty() {
            let status = if status == SearchStatus::Ok {
                SearchStatus::Empty
            } else {
                status
            };
            return SearchResponse {
                query,
                hits: Vec::new(),
                status,
                rerank: None,
            };
        }

        // Step 3: Recency and identity boosts
        let identities = identity_tokens(&query.expanded, &self.context.aliases);
        apply_boosts(
            &mut candidates,
            &identities,
            request.apply_recency_boost,
            self.today(),
            &self.boosts,
        );
        sort_by_hybrid_score(&mut candidates);

        // Step 4: Collapse overlapping chunks
        let candidates = deduplicate_overlapping(candidates);

        // Step 5: Protect exact matches of factual queries, then rerank
        let protected = find_protected_indices(
            &query.expanded,
            query.kind,
            &candidates,
            self.config.max_protected,
        );
        tracing::debug!(
            "{} candidates after dedup, protected {:?}",
            candidates.len(),
            protected
        );

        let (hits, rerank) = if use_reranker {
            let outcome = self
                .rerank(&query.expanded, candidates, request.top_k, protected)
                .await;
            (outcome.hits, Some(outcome.mode))
        } else {
            let mut hits = candidates;
            hits.truncate(request.top_k);
            (hits, None)
        };

        SearchResponse {
            query,
            hits,
            status,
            rerank,
        }
    }

    /// Run one sub-search on the blocking pool under the source timeout
    async fn run_source(
        &self,
        source: Arc<dyn RetrievalSource>,
        query: &str,
        k: usize,
    ) -> std::result::Result<Vec<SourceHit>, String> {
        let signal = source.signal();
        let query = query.to_string();
        let timeout = self.config.source_timeout();

        let task = tokio::task::spawn_blocking(move || source.search(&query, k));
        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(hits))) => Ok(hits),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(e)) => Err(format!("{} search task failed: {}", signal, e)),
            Err(_) => Err(format!(
                "{} search timed out after {}ms",
                signal,
                timeout.as_millis()
            )),
        };

        match &result {
            Ok(hits) => tracing::debug!("{} search returned {} hits", signal, hits.len()),
            Err(e) => tracing::warn!(signal = %signal, reason = %e, "Sub-search failed"),
        }
        result
    }

    /// Fuse both lists by rank and attach each id's chunk record
    ///
    /// When both engines return a chunk, the vector store's copy is used.
    fn fuse(
        &self,
        keyword_hits: Vec<SourceHit>,
        vector_hits: Vec<SourceHit>,
        limit: usize,
    ) -> Vec<RankedHit> {
        let keyword_ids: Vec<String> = keyword_hits.iter().map(|h| h.chunk.id.clone()).collect();
        let vector_ids: Vec<String> = vector_hits.iter().map(|h| h.chunk.id.clone()).collect();

        let mut records: HashMap<String, Chunk> =
            HashMap::with_capacity(keyword_hits.len() + vector_hits.len());
        for hit in keyword_hits.into_iter().chain(vector_hits) {
            records.insert(hit.chunk.id.clone(), hit.chunk);
        }

        let mut fused = reciprocal_rank_fusion(&vector_ids, &keyword_ids, &self.fusion);
        fused.truncate(limit);

        fused
            .into_iter()
            .filter_map(|entry| {
                let chunk = records.remove(&entry.id)?;
                let mut hit = RankedHit::new(chunk, entry.score);
                hit.keyword_rank = entry.keyword_rank;
                hit.vector_rank = entry.vector_rank;
                Some(hit)
            })
            .collect()
    }

    /// Cross-encoder pass under the rerank timeout
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RankedHit>,
        top_k: usize,
        protected: Vec<usize>,
    ) -> RerankOutcome {
        let reranker = self.context.reranker.clone();
        let query = query.to_string();
        let backup = candidates.clone();
        let task_protected = protected.clone();

        let task = tokio::task::spawn_blocking(move || {
            reranker.rerank(&query, candidates, top_k, &task_protected)
        });

        let outcome = match tokio::time::timeout(self.config.rerank_timeout(), task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let reason = format!("rerank task failed: {}", e);
                Reranker::fallback_order(backup, top_k, &protected, &reason)
            }
            Err(_) => {
                let reason = format!(
                    "rerank timed out after {}ms",
                    self.config.rerank_timeout().as_millis()
                );
                Reranker::fallback_order(backup, top_k, &protected, &reason)
            }
        };

        if let RerankMode::Fallback(reason) = &outcome.mode {
            self.degradations.record("reranker", "hybrid_order", reason);
        }
        tracing::debug!("Rerank mode: {:?}", outcome.mode);

        outcome
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }
}
