//! Configuration management for Recollect
//!
//! Loads the TOML configuration file, applies profile and environment
//! overrides, and validates the result before anything else is constructed.

use crate::error::{RecollectError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Schema version understood by this build
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the keyword and vector indices
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn keyword_index_dir(&self) -> PathBuf {
        self.data_dir.join("keywords")
    }

    pub fn vector_index_path(&self) -> PathBuf {
        self.data_dir.join("vectors").join("chunks.json")
    }
}

/// Where the identity alias table comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub people_file: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
}

/// Ranking pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of results returned by a search
    pub top_k: usize,
    /// RRF K constant (typically 60)
    pub rrf_k: f64,
    /// Largest recency multiplier contribution (0.5 = +50%)
    pub max_recency_boost: f64,
    /// Age in days at which the recency boost reaches zero
    pub recency_horizon_days: i64,
    /// Multiplier applied when a queried identity appears in the file name
    pub filename_boost: f64,
    /// Whether cross-encoder reranking runs when the caller does not say
    pub reranker_enabled: bool,
    pub reranker_model: String,
    /// Candidates fetched from each signal when reranking
    pub rerank_candidates: usize,
    /// Upper bound on hits protected from reranking for factual queries
    pub max_protected: usize,
    pub source_timeout_ms: u64,
    pub rerank_timeout_ms: u64,
}

impl RetrievalConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn rerank_timeout(&self) -> Duration {
        Duration::from_millis(self.rerank_timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            rrf_k: 60.0,
            max_recency_boost: 0.5,
            recency_horizon_days: 365,
            filename_boost: 2.0,
            reranker_enabled: true,
            reranker_model: "BAAI/bge-reranker-base".to_string(),
            rerank_candidates: 50,
            max_protected: 3,
            source_timeout_ms: 5_000,
            rerank_timeout_ms: 15_000,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_candidates: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RecollectError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RecollectError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RecollectError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| RecollectError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(enabled) = overrides.reranker_enabled {
            self.retrieval.reranker_enabled = enabled;
        }
        if let Some(candidates) = overrides.rerank_candidates {
            self.retrieval.rerank_candidates = candidates;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RECOLLECT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("RECOLLECT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    pub(crate) fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "IDENTITY__PEOPLE_FILE" => {
                self.identity.people_file = PathBuf::from(value);
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "RETRIEVAL__RERANKER_ENABLED" => {
                self.retrieval.reranker_enabled = parse_env(path, value)?;
            }
            "RETRIEVAL__RERANKER_MODEL" => {
                self.retrieval.reranker_model = value.to_string();
            }
            "RETRIEVAL__RERANK_CANDIDATES" => {
                self.retrieval.rerank_candidates = parse_env(path, value)?;
            }
            "RETRIEVAL__TOP_K" => {
                self.retrieval.top_k = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Replace a leading `~/` in every configured path with the home directory
    pub fn expand_paths(&mut self) -> Result<()> {
        self.storage.data_dir = expand_path(&self.storage.data_dir)?;
        self.identity.people_file = expand_path(&self.identity.people_file)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            RecollectError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("recollect").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| RecollectError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".recollect"))
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RecollectError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RecollectError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| RecollectError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.recollect");
        let config_dir = PathBuf::from("~/.config/recollect");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig { data_dir },
            identity: IdentityConfig {
                people_file: config_dir.join("people.toml"),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            indexing: IndexingConfig {
                vector_dim: 384,
                hnsw_ef_construction: 200,
                hnsw_m: 16,
                hnsw_ef_search: 64,
            },
            retrieval: RetrievalConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.retrieval.rrf_k, 60.0);
        assert_eq!(parsed.retrieval.rerank_candidates, 50);
        assert_eq!(parsed.meta.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "fast".to_string(),
            ProfileOverrides {
                reranker_enabled: Some(false),
                top_k: Some(5),
                ..Default::default()
            },
        );

        config.apply_profile("fast").unwrap();
        assert!(!config.retrieval.reranker_enabled);
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_env_value_parsing() {
        let mut config = Config::default();
        config
            .set_value_from_env("RETRIEVAL__RERANKER_ENABLED", "false")
            .unwrap();
        assert!(!config.retrieval.reranker_enabled);

        let err = config.set_value_from_env("RETRIEVAL__TOP_K", "many");
        assert!(err.is_err());
    }

    #[test]
    fn test_expand_paths() {
        let mut config = Config::default();
        config.expand_paths().unwrap();
        assert!(!config.storage.data_dir.starts_with("~"));
        assert!(config.identity.people_file.ends_with("recollect/people.toml"));

        let absolute = Path::new("/srv/recollect");
        assert_eq!(expand_path(absolute).unwrap(), absolute);
    }
}
