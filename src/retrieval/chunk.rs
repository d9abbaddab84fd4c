//! Chunk records and per-query ranked hits

use serde::{Deserialize, Serialize};
use std::path::Path;

/// `chunk_index` value used for document-level summaries
pub const SUMMARY_CHUNK_INDEX: i64 = -1;

const ID_SEPARATOR: &str = "::";
const SUMMARY_SUFFIX: &str = "summary";

/// A unit of retrievable text, produced and owned by ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id: `<file_path>::<ordinal>` or `<file_path>::summary`
    pub id: String,

    /// Chunk text, possibly with a prepended context paragraph
    pub content: String,

    #[serde(default)]
    pub file_path: String,

    #[serde(default)]
    pub file_name: String,

    /// Ordinal within the source file, `SUMMARY_CHUNK_INDEX` for summaries
    #[serde(default)]
    pub chunk_index: Option<i64>,

    /// Canonical identities mentioned in the chunk
    #[serde(default)]
    pub people: Vec<String>,

    /// ISO date (or datetime) the source was last modified
    #[serde(default)]
    pub modified_date: Option<String>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            file_path: String::new(),
            file_name: String::new(),
            chunk_index: None,
            people: Vec::new(),
            modified_date: None,
        }
    }

    /// Build the chunk at `ordinal` of `file_path`, with the standard id
    pub fn for_file(file_path: &str, ordinal: i64, content: impl Into<String>) -> Self {
        Self {
            id: Self::make_id(file_path, ordinal),
            content: content.into(),
            file_path: file_path.to_string(),
            file_name: basename(file_path).to_string(),
            chunk_index: Some(ordinal),
            people: Vec::new(),
            modified_date: None,
        }
    }

    pub fn make_id(file_path: &str, ordinal: i64) -> String {
        format!("{}{}{}", file_path, ID_SEPARATOR, ordinal)
    }

    pub fn summary_id(file_path: &str) -> String {
        format!("{}{}{}", file_path, ID_SEPARATOR, SUMMARY_SUFFIX)
    }

    pub fn with_people(mut self, people: Vec<String>) -> Self {
        self.people = people;
        self
    }

    pub fn with_modified_date(mut self, date: impl Into<String>) -> Self {
        self.modified_date = Some(date.into());
        self
    }

    pub fn is_summary(&self) -> bool {
        self.chunk_index == Some(SUMMARY_CHUNK_INDEX)
            || self.id.ends_with(&format!("{}{}", ID_SEPARATOR, SUMMARY_SUFFIX))
    }

    /// Source path from the record, falling back to the id prefix
    pub fn source_path(&self) -> Option<&str> {
        if !self.file_path.is_empty() {
            return Some(&self.file_path);
        }
        let (prefix, _) = split_id(&self.id)?;
        (!prefix.is_empty()).then_some(prefix)
    }

    /// Ordinal position, from the record or a numeric id suffix
    ///
    /// Summaries and chunks without a usable ordinal return `None`.
    pub fn resolved_chunk_index(&self) -> Option<i64> {
        match self.chunk_index {
            Some(index) if index >= 0 => Some(index),
            Some(_) => None,
            None => split_id(&self.id)
                .and_then(|(_, suffix)| suffix.parse::<i64>().ok())
                .filter(|index| *index >= 0),
        }
    }

    /// File name from the record, falling back to the basename of the path
    pub fn display_name(&self) -> &str {
        if !self.file_name.is_empty() {
            &self.file_name
        } else {
            self.source_path().map(basename).unwrap_or("")
        }
    }

    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            self.content.clone()
        } else {
            let cut: String = self.content.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}

/// Split an id into `(path, suffix)` on `::` or a trailing `_N`
fn split_id(id: &str) -> Option<(&str, &str)> {
    if let Some((prefix, suffix)) = id.rsplit_once(ID_SEPARATOR) {
        return Some((prefix, suffix));
    }
    id.rsplit_once('_')
        .filter(|(_, suffix)| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// A chunk plus the scores accumulated while ranking one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    #[serde(flatten)]
    pub chunk: Chunk,

    /// Zero-based rank in the keyword list
    pub keyword_rank: Option<usize>,

    /// Zero-based rank in the vector list
    pub vector_rank: Option<usize>,

    pub rrf_score: f64,

    /// RRF score after recency and identity boosts
    pub hybrid_score: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_encoder_score: Option<f64>,

    #[serde(default)]
    pub protected: bool,
}

impl RankedHit {
    pub fn new(chunk: Chunk, rrf_score: f64) -> Self {
        Self {
            chunk,
            keyword_rank: None,
            vector_rank: None,
            rrf_score,
            hybrid_score: rrf_score,
            cross_encoder_score: None,
            protected: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    pub fn content(&self) -> &str {
        &self.chunk.content
    }

    /// Score the final ordering was based on
    pub fn final_score(&self) -> f64 {
        self.cross_encoder_score.unwrap_or(self.hybrid_score)
    }
}
