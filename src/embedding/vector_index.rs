/// HNSW vector index over chunk embeddings
use crate::retrieval::Chunk;
use ahash::{HashMap, HashMapExt};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

const MAX_LAYERS: usize = 16;
const MIN_CAPACITY: usize = 10_000;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Vector index lock poisoned")]
    LockPoisoned,
}

/// Search result with the stored chunk and its similarity
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Cosine similarity, higher is more similar
    pub score: f32,
}

/// A persisted (chunk, embedding) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// HNSW graph parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub dimension: usize,
    pub ef_construction: usize,
    pub m: usize,
}

struct VectorState {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Graph data id -> record, `None` once superseded or deleted
    slots: Vec<Option<VectorRecord>>,
    by_id: HashMap<String, usize>,
    tombstones: usize,
}

impl VectorState {
    fn new(params: &HnswParams, capacity: usize) -> Self {
        Self {
            hnsw: Hnsw::<f32, DistCosine>::new(
                params.m,
                capacity.max(MIN_CAPACITY),
                MAX_LAYERS,
                params.ef_construction,
                DistCosine,
            ),
            slots: Vec::new(),
            by_id: HashMap::new(),
            tombstones: 0,
        }
    }

    fn tombstone(&mut self, id: &str) -> bool {
        match self.by_id.remove(id) {
            Some(slot) => {
                if let Some(entry) = self.slots.get_mut(slot) {
                    *entry = None;
                }
                self.tombstones += 1;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, record: VectorRecord) {
        self.tombstone(&record.chunk.id);
        let slot = self.slots.len();
        self.hnsw.insert((record.embedding.as_slice(), slot));
        self.by_id.insert(record.chunk.id.clone(), slot);
        self.slots.push(Some(record));
    }
}

/// HNSW vector index wrapper
///
/// Chunks are keyed by their string id. The graph itself cannot remove
/// points, so replaced and deleted chunks leave tombstoned slots that
/// searches skip. Reopening from disk rebuilds a compact graph.
pub struct VectorIndex {
    state: RwLock<VectorState>,
    params: HnswParams,
    records_path: Option<PathBuf>,
}

impl VectorIndex {
    /// Open the index persisted at `records_path`, or start an empty one
    ///
    /// # Arguments
    /// * `params` - Dimension and HNSW construction parameters
    /// * `records_path` - JSON file holding the live records
    pub fn open(params: HnswParams, records_path: PathBuf) -> Result<Self, VectorIndexError> {
        let records: Vec<VectorRecord> = if records_path.exists() {
            let raw = std::fs::read_to_string(&records_path)?;
            serde_json::from_str(&raw)
                .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?
        } else {
            Vec::new()
        };

        let index = Self::build(params, records, Some(records_path))?;
        tracing::info!("Vector index ready with {} chunks", index.len());
        Ok(index)
    }

    /// Create an index that is never written to disk
    pub fn in_memory(params: HnswParams) -> Self {
        Self {
            state: RwLock::new(VectorState::new(&params, 0)),
            params,
            records_path: None,
        }
    }

    fn build(
        params: HnswParams,
        records: Vec<VectorRecord>,
        records_path: Option<PathBuf>,
    ) -> Result<Self, VectorIndexError> {
        let mut state = VectorState::new(&params, records.len());
        for record in records {
            check_dimension(params.dimension, &record.embedding)?;
            state.insert(record);
        }

        Ok(Self {
            state: RwLock::new(state),
            params,
            records_path,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, VectorState>, VectorIndexError> {
        self.state.read().map_err(|_| VectorIndexError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, VectorState>, VectorIndexError> {
        self.state.write().map_err(|_| VectorIndexError::LockPoisoned)
    }

    pub fn path(&self) -> Option<&Path> {
        self.records_path.as_deref()
    }

    /// Insert a chunk, superseding any earlier embedding for the same id
    pub fn upsert(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<(), VectorIndexError> {
        check_dimension(self.params.dimension, &embedding)?;
        self.write()?.insert(VectorRecord { chunk, embedding });
        Ok(())
    }

    /// Insert multiple chunks in batch
    pub fn upsert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<(), VectorIndexError> {
        for (_, embedding) in &items {
            check_dimension(self.params.dimension, embedding)?;
        }
        let mut state = self.write()?;
        for (chunk, embedding) in items {
            state.insert(VectorRecord { chunk, embedding });
        }
        Ok(())
    }

    /// Remove a chunk; returns whether it was present
    pub fn delete(&self, id: &str) -> Result<bool, VectorIndexError> {
        Ok(self.write()?.tombstone(id))
    }

    /// Stored chunk for `id`
    pub fn get(&self, id: &str) -> Result<Option<Chunk>, VectorIndexError> {
        let state = self.read()?;
        Ok(state
            .by_id
            .get(id)
            .and_then(|slot| state.slots.get(*slot))
            .and_then(|entry| entry.as_ref())
            .map(|record| record.chunk.clone()))
    }

    /// Search for k nearest neighbors
    ///
    /// # Arguments
    /// * `query` - Query vector
    /// * `k` - Number of results to return
    /// * `ef_search` - HNSW search parameter (higher = better recall, slower search)
    ///
    /// # Returns
    /// Live chunks sorted by similarity descending
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        check_dimension(self.params.dimension, query)?;

        let state = self.read()?;
        if k == 0 || state.by_id.is_empty() {
            return Ok(Vec::new());
        }

        // Tombstoned neighbours are filtered out, so ask for enough to cover them
        let fetch = (k + state.tombstones).min(state.slots.len());
        let neighbours = state.hnsw.search(query, fetch, ef_search.max(fetch));

        let mut results: Vec<SearchResult> = neighbours
            .into_iter()
            .filter_map(|neighbour| {
                let record = state.slots.get(neighbour.d_id)?.as_ref()?;
                Some(SearchResult {
                    chunk: record.chunk.clone(),
                    score: 1.0 - neighbour.distance,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);

        Ok(results)
    }

    /// Write live records to the backing file
    pub fn save(&self) -> Result<(), VectorIndexError> {
        let Some(path) = &self.records_path else {
            return Ok(());
        };

        let state = self.read()?;
        let live: Vec<&VectorRecord> = state.slots.iter().flatten().collect();
        let json = serde_json::to_string(&live)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;

        tracing::debug!("Saved {} vector records to {}", live.len(), path.display());
        Ok(())
    }

    /// Number of live chunks
    pub fn len(&self) -> usize {
        self.read().map(|state| state.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.params.dimension
    }

    /// Drop every vector
    pub fn clear(&self) -> Result<(), VectorIndexError> {
        let mut state = self.write()?;
        *state = VectorState::new(&self.params, 0);
        Ok(())
    }
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), VectorIndexError> {
    if vector.len() != expected {
        return Err(VectorIndexError::InvalidDimension {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}
