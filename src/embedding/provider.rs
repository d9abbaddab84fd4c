/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// Query text and chunk text go through the same provider, so their vectors
/// live in one space.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one per input in order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Supported local models: (names, model, dimension, approximate download MB)
const SUPPORTED_MODELS: &[(&[&str], EmbeddingModel, usize, usize)] = &[
    (
        &["all-MiniLM-L6-v2", "all-minilm-l6-v2"],
        EmbeddingModel::AllMiniLML6V2,
        384,
        90,
    ),
    (&["bge-small-en-v1.5"], EmbeddingModel::BGESmallENV15, 384, 130),
    (&["bge-base-en-v1.5"], EmbeddingModel::BGEBaseENV15, 768, 440),
    (
        &["nomic-embed-text-v1.5"],
        EmbeddingModel::NomicEmbedTextV15,
        768,
        520,
    ),
];

/// Dimension produced by a supported model name
pub fn model_dimension(model_name: &str) -> Option<usize> {
    SUPPORTED_MODELS
        .iter()
        .find(|(names, ..)| names.contains(&model_name))
        .map(|(_, _, dimension, _)| *dimension)
}

/// FastEmbed provider for local embedding generation
///
/// Models are downloaded on first use to the fastembed cache and run
/// offline afterwards.
pub struct FastEmbedProvider {
    model: TextEmbedding,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (_, embedding_model, dimension, model_size_mb) = SUPPORTED_MODELS
            .iter()
            .find(|(names, ..)| names.contains(&model_name))
            .ok_or_else(|| {
                let known: Vec<&str> =
                    SUPPORTED_MODELS.iter().map(|(names, ..)| names[0]).collect();
                EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: {}",
                    model_name,
                    known.join(", ")
                ))
            })?;

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options =
            InitOptions::new(embedding_model.clone()).with_show_download_progress(false);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model,
            model_name: model_name.to_string(),
            dimension: *dimension,
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }

    fn check(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embedding = self
            .model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".into()))?;

        self.check(&embedding)?;
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empty inputs would misalign results with their chunks
        if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at position {}",
                position
            )));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        for embedding in &embeddings {
            self.check(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_dimension_lookup() {
        assert_eq!(model_dimension("all-MiniLM-L6-v2"), Some(384));
        assert_eq!(model_dimension("bge-base-en-v1.5"), Some(768));
        assert_eq!(model_dimension("word2vec"), None);
    }

    #[test]
    fn test_unsupported_model() {
        assert!(matches!(
            FastEmbedProvider::new("word2vec"),
            Err(EmbeddingError::InitializationError(_))
        ));
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_single_embedding() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let embedding = provider.embed("Jane renewed her passport in March").unwrap();
        assert_eq!(embedding.len(), 384);

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.1);
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_batch_rejects_empty_entries() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let texts = vec!["first".to_string(), "  ".to_string()];
        assert!(matches!(
            provider.embed_batch(&texts),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_semantic_similarity() {
        let provider = FastEmbedProvider::with_default_model().unwrap();

        let emb1 = provider.embed("The cat sits on the mat.").unwrap();
        let emb2 = provider.embed("A feline rests on the rug.").unwrap();
        let emb3 = provider.embed("Quarterly tax filing deadline.").unwrap();

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&emb1, &emb2) > dot(&emb1, &emb3));
    }
}
