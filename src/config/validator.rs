use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{RecollectError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_paths(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RecollectError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_paths(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is not checked: paths may contain ~ and the people file is optional.
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.identity.people_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "identity.people_file",
                "People file path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        if !retrieval.rrf_k.is_finite() || retrieval.rrf_k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be a non-negative number, got {}", retrieval.rrf_k),
            ));
        }

        if !(0.0..=1.0).contains(&retrieval.max_recency_boost) {
            errors.push(ValidationError::new(
                "retrieval.max_recency_boost",
                format!(
                    "Recency boost must be between 0.0 and 1.0, got {}",
                    retrieval.max_recency_boost
                ),
            ));
        }

        if retrieval.recency_horizon_days <= 0 {
            errors.push(ValidationError::new(
                "retrieval.recency_horizon_days",
                "Recency horizon must be at least one day",
            ));
        }

        if !retrieval.filename_boost.is_finite() || retrieval.filename_boost < 1.0 {
            errors.push(ValidationError::new(
                "retrieval.filename_boost",
                format!(
                    "Filename boost must be at least 1.0, got {}",
                    retrieval.filename_boost
                ),
            ));
        }

        if retrieval.reranker_model.is_empty() {
            errors.push(ValidationError::new(
                "retrieval.reranker_model",
                "Reranker model name cannot be empty",
            ));
        }

        if retrieval.rerank_candidates == 0 {
            errors.push(ValidationError::new(
                "retrieval.rerank_candidates",
                "Rerank candidates must be greater than 0",
            ));
        }

        if retrieval.source_timeout_ms == 0 || retrieval.rerank_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.source_timeout_ms",
                "Timeouts must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_people_path() {
        let mut config = Config::default();
        config.identity.people_file = PathBuf::new();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        config.retrieval.max_recency_boost = 3.0;
        config.indexing.hnsw_m = 0;

        match ConfigValidator::validate(&config) {
            Err(RecollectError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().any(|e| e.path == "retrieval.top_k"));
            }
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }
}
