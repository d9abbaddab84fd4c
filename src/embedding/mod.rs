//! Embedding generation and the two retrieval indices
//!
//! - `EmbeddingProvider` trait with a local FastEmbed implementation
//! - HNSW vector index keyed by chunk id
//! - Tantivy BM25 keyword index over chunk content, file name and people
//! - Batch processing that fills both indices from ingestion output

mod batch;
mod keyword_index;
mod provider;
mod vector_index;

pub use batch::{read_chunks_jsonl, remove_chunks, BatchProcessor, BatchResult};
pub use keyword_index::{KeywordIndex, KeywordIndexError, KeywordSearchResult};
pub use provider::{model_dimension, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{HnswParams, SearchResult, VectorIndex, VectorIndexError, VectorRecord};
