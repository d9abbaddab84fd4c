//! Recollect - Hybrid Retrieval & Ranking Engine
//!
//! Ranks previously indexed document chunks against a natural-language query
//! by fusing keyword and vector search, boosting recent and person-named
//! sources, collapsing overlapping chunks, and reranking with a cross-encoder
//! that preserves exact factual matches.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod query;
pub mod retrieval;

pub use error::{RecollectError, Result};
pub use retrieval::{HybridSearcher, RetrievalContext, SearchRequest, SearchResponse, SearchStatus};
