/// Batch processor that embeds chunks and writes both indices
use super::{EmbeddingError, EmbeddingProvider, KeywordIndex, VectorIndex};
use crate::retrieval::Chunk;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of batch processing
#[derive(Debug, Default)]
pub struct BatchResult {
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Embedding and indexing for ingestion-produced chunks
///
/// Chunks are embedded `batch_size` at a time. A failed batch is counted and
/// skipped; the rest of the run continues.
pub struct BatchProcessor {
    provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<VectorIndex>,
    keyword_index: Arc<KeywordIndex>,
    batch_size: usize,
}

impl BatchProcessor {
    /// Create a new batch processor
    ///
    /// # Arguments
    /// * `provider` - Embedding provider
    /// * `vector_index` - Vector index for similarity search
    /// * `keyword_index` - Keyword index for full-text search
    /// * `batch_size` - Number of chunks to embed in one call
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<VectorIndex>,
        keyword_index: Arc<KeywordIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            vector_index,
            keyword_index,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed and index `chunks`, then persist both indices
    pub async fn process(&self, chunks: Vec<Chunk>) -> Result<BatchResult> {
        let start = std::time::Instant::now();
        info!("Starting batch processing of {} chunks", chunks.len());

        let mut result = BatchResult::default();

        for batch in chunks.chunks(self.batch_size) {
            let provider = self.provider.clone();
            let vector_index = self.vector_index.clone();
            let keyword_index = self.keyword_index.clone();
            let batch = batch.to_vec();
            let size = batch.len();

            let outcome = tokio::task::spawn_blocking(move || {
                index_batch(provider.as_ref(), &vector_index, &keyword_index, batch)
            })
            .await?;

            match outcome {
                Ok(count) => {
                    result.processed += count;
                    debug!("Indexed batch of {} chunks", count);
                }
                Err(e) => {
                    warn!("Failed to index batch: {}", e);
                    result.failed += size;
                }
            }
        }

        self.keyword_index
            .commit()
            .context("Failed to commit keyword index")?;
        self.vector_index
            .save()
            .context("Failed to save vector index")?;

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Batch processing complete: {} processed, {} failed, {}ms",
            result.processed, result.failed, result.duration_ms
        );

        Ok(result)
    }

    /// Remove chunks from both indices and persist the change
    pub fn remove(&self, ids: &[String]) -> Result<usize> {
        remove_chunks(&self.keyword_index, &self.vector_index, ids)
    }
}

/// Delete `ids` from both indices, returning how many vectors were present
pub fn remove_chunks(
    keyword_index: &KeywordIndex,
    vector_index: &VectorIndex,
    ids: &[String],
) -> Result<usize> {
    let mut removed = 0;
    for id in ids {
        keyword_index.delete(id)?;
        if vector_index.delete(id)? {
            removed += 1;
        }
    }
    keyword_index.commit()?;
    vector_index.save()?;
    info!("Removed {} of {} requested chunks", removed, ids.len());
    Ok(removed)
}

fn index_batch(
    provider: &dyn EmbeddingProvider,
    vector_index: &VectorIndex,
    keyword_index: &KeywordIndex,
    batch: Vec<Chunk>,
) -> Result<usize, EmbeddingError> {
    let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
    let embeddings = provider.embed_batch(&texts)?;

    if embeddings.len() != batch.len() {
        return Err(EmbeddingError::GenerationError(format!(
            "Embedding count mismatch: expected {}, got {}",
            batch.len(),
            embeddings.len()
        )));
    }

    // Vectors first: upsert_batch checks every embedding before inserting any
    let ids: Vec<String> = batch.iter().map(|chunk| chunk.id.clone()).collect();
    vector_index
        .upsert_batch(batch.iter().cloned().zip(embeddings).collect())
        .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

    if let Err(e) = keyword_index.add_or_update_batch(&batch) {
        for id in &ids {
            let _ = keyword_index.delete(id);
            let _ = vector_index.delete(id);
        }
        return Err(EmbeddingError::GenerationError(e.to_string()));
    }

    Ok(batch.len())
}

/// Read one JSON chunk per line, skipping blank lines
pub fn read_chunks_jsonl(path: &Path) -> Result<Vec<Chunk>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str::<Chunk>(line)
                .with_context(|| format!("{}:{}: invalid chunk", path.display(), number + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HnswParams, VectorIndex};
    use tempfile::TempDir;

    /// Deterministic bag-of-letters embedding
    struct LetterProvider;

    impl EmbeddingProvider for LetterProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.01f32; 26];
            for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            26
        }

        fn model_name(&self) -> &str {
            "letters"
        }
    }

    /// Returns embeddings of the wrong width
    struct NarrowProvider;

    impl EmbeddingProvider for NarrowProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0; 3])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "narrow"
        }
    }

    fn processor(temp: &TempDir) -> BatchProcessor {
        let params = HnswParams {
            dimension: 26,
            ef_construction: 100,
            m: 16,
        };
        let vector_index =
            Arc::new(VectorIndex::open(params, temp.path().join("vectors/chunks.json")).unwrap());
        let keyword_index = Arc::new(KeywordIndex::new(temp.path().join("keywords")).unwrap());
        BatchProcessor::new(Arc::new(LetterProvider), vector_index, keyword_index, 2)
    }

    #[tokio::test]
    async fn test_batch_processing() {
        let temp = TempDir::new().unwrap();
        let processor = processor(&temp);

        let chunks: Vec<Chunk> = (0..5)
            .map(|i| Chunk::for_file("/vault/notes.md", i, format!("note number {}", i)))
            .collect();

        let result = processor.process(chunks).await.unwrap();
        assert_eq!(result.processed, 5);
        assert_eq!(result.failed, 0);
        assert_eq!(processor.vector_index.len(), 5);
        assert_eq!(processor.keyword_index.count(), 5);
        assert!(temp.path().join("vectors/chunks.json").exists());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let temp = TempDir::new().unwrap();
        let result = processor(&temp).process(Vec::new()).await.unwrap();
        assert_eq!(result.processed, 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = TempDir::new().unwrap();
        let processor = processor(&temp);
        processor
            .process(vec![Chunk::new("a::0", "alpha"), Chunk::new("b::0", "beta")])
            .await
            .unwrap();

        let removed = processor.remove(&["a::0".to_string()]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(processor.keyword_index.count(), 1);
        assert_eq!(processor.vector_index.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_both_indices_untouched() {
        let temp = TempDir::new().unwrap();
        let base = processor(&temp);
        let processor = BatchProcessor::new(
            Arc::new(NarrowProvider),
            base.vector_index.clone(),
            base.keyword_index.clone(),
            2,
        );

        let chunks: Vec<Chunk> = (0..3)
            .map(|i| Chunk::for_file("/vault/notes.md", i, format!("note number {}", i)))
            .collect();

        let result = processor.process(chunks).await.unwrap();
        assert_eq!(result.processed, 0);
        assert_eq!(result.failed, 3);
        assert_eq!(processor.vector_index.len(), 0);
        assert_eq!(processor.keyword_index.count(), 0);
    }

    #[test]
    fn test_read_chunks_jsonl() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chunks.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"id\":\"/a.md::0\",\"content\":\"first\",\"chunk_index\":0}\n",
                "\n",
                "{\"id\":\"/a.md::1\",\"content\":\"second\"}\n",
            ),
        )
        .unwrap();

        let chunks = read_chunks_jsonl(&path).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].resolved_chunk_index(), Some(1));

        std::fs::write(&path, "not json\n").unwrap();
        assert!(read_chunks_jsonl(&path).is_err());
    }
}
