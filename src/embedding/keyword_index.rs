/// Tantivy keyword index for full-text chunk search
use crate::retrieval::Chunk;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError};
use thiserror::Error;

/// Words dropped from keyword queries
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "what", "when", "where", "who", "which", "how",
    "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Query syntax operators the parser would otherwise interpret
const OPERATORS: &[&str] = &["AND", "OR", "NOT"];

const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),

    #[error("Index writer lock poisoned")]
    LockPoisoned,
}

/// Search result carrying the stored chunk and its BM25 score
#[derive(Debug, Clone)]
pub struct KeywordSearchResult {
    pub chunk: Chunk,
    /// BM25 relevance score, higher is better
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
struct ChunkFields {
    id: Field,
    content: Field,
    file_name: Field,
    file_path: Field,
    people: Field,
    chunk_index: Field,
    modified_date: Field,
}

impl ChunkFields {
    fn build_schema() -> (Schema, Self) {
        let mut builder = Schema::builder();
        let fields = Self {
            id: builder.add_text_field("id", STRING | STORED),
            content: builder.add_text_field("content", TEXT | STORED),
            file_name: builder.add_text_field("file_name", TEXT | STORED),
            file_path: builder.add_text_field("file_path", STRING | STORED),
            people: builder.add_text_field("people", TEXT | STORED),
            chunk_index: builder.add_i64_field("chunk_index", STORED),
            modified_date: builder.add_text_field("modified_date", STORED),
        };
        (builder.build(), fields)
    }

    fn from_schema(schema: &Schema) -> Result<Self, KeywordIndexError> {
        let field = |name: &str| {
            schema.get_field(name).map_err(|_| {
                KeywordIndexError::InitializationError(format!(
                    "Missing '{}' field in schema",
                    name
                ))
            })
        };

        Ok(Self {
            id: field("id")?,
            content: field("content")?,
            file_name: field("file_name")?,
            file_path: field("file_path")?,
            people: field("people")?,
            chunk_index: field("chunk_index")?,
            modified_date: field("modified_date")?,
        })
    }
}

/// Tantivy keyword index wrapper
///
/// Provides full-text search with BM25 ranking. The writer sits behind a
/// mutex so the index can be shared as `Arc<KeywordIndex>`.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: ChunkFields,
    sanitizer: Regex,
    index_path: Option<PathBuf>,
}

impl KeywordIndex {
    /// Open the index at `index_path`, creating it if absent
    ///
    /// # Arguments
    /// * `index_path` - Directory to store the index
    pub fn new(index_path: PathBuf) -> Result<Self, KeywordIndexError> {
        let index = if index_path.join("meta.json").exists() {
            tracing::debug!("Opening keyword index at {}", index_path.display());
            Index::open_in_dir(&index_path)
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        } else {
            std::fs::create_dir_all(&index_path)?;
            let (schema, _) = ChunkFields::build_schema();
            tracing::info!("Creating keyword index at {}", index_path.display());
            Index::create_in_dir(&index_path, schema)
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        };

        Self::from_index(index, Some(index_path))
    }

    /// Create a throwaway index held in RAM
    pub fn in_memory() -> Result<Self, KeywordIndexError> {
        let (schema, _) = ChunkFields::build_schema();
        Self::from_index(Index::create_in_ram(schema), None)
    }

    fn from_index(index: Index, index_path: Option<PathBuf>) -> Result<Self, KeywordIndexError> {
        let fields = ChunkFields::from_schema(&index.schema())?;

        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let sanitizer = Regex::new(r"[^\w\s]")
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            sanitizer,
            index_path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.index_path.as_deref()
    }

    fn to_document(&self, chunk: &Chunk) -> TantivyDocument {
        let f = &self.fields;
        let mut doc = TantivyDocument::default();
        doc.add_text(f.id, &chunk.id);
        doc.add_text(f.content, &chunk.content);
        doc.add_text(f.file_name, chunk.display_name());
        if let Some(path) = chunk.source_path() {
            doc.add_text(f.file_path, path);
        }
        for person in &chunk.people {
            doc.add_text(f.people, person);
        }
        if let Some(index) = chunk.chunk_index {
            doc.add_i64(f.chunk_index, index);
        }
        if let Some(date) = &chunk.modified_date {
            doc.add_text(f.modified_date, date);
        }
        doc
    }

    fn to_chunk(&self, doc: &TantivyDocument) -> Option<Chunk> {
        let f = &self.fields;
        let text = |field: Field| doc.get_first(field).and_then(|v| v.as_str());

        let mut chunk = Chunk::new(text(f.id)?, text(f.content).unwrap_or_default());
        chunk.file_name = text(f.file_name).unwrap_or_default().to_string();
        chunk.file_path = text(f.file_path).unwrap_or_default().to_string();
        chunk.people = doc
            .get_all(f.people)
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect();
        chunk.chunk_index = doc.get_first(f.chunk_index).and_then(|v| v.as_i64());
        chunk.modified_date = text(f.modified_date).map(str::to_string);
        Some(chunk)
    }

    /// Insert a chunk, replacing any previous version with the same id
    pub fn add_or_update(&self, chunk: &Chunk) -> Result<(), KeywordIndexError> {
        let writer = self.writer.lock().map_err(|_| KeywordIndexError::LockPoisoned)?;
        writer.delete_term(Term::from_field_text(self.fields.id, &chunk.id));
        writer
            .add_document(self.to_document(chunk))
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        Ok(())
    }

    /// Insert multiple chunks in batch
    pub fn add_or_update_batch(&self, chunks: &[Chunk]) -> Result<(), KeywordIndexError> {
        for chunk in chunks {
            self.add_or_update(chunk)?;
        }
        Ok(())
    }

    /// Delete a chunk by id
    pub fn delete(&self, id: &str) -> Result<(), KeywordIndexError> {
        let writer = self.writer.lock().map_err(|_| KeywordIndexError::LockPoisoned)?;
        writer.delete_term(Term::from_field_text(self.fields.id, id));
        Ok(())
    }

    /// Commit all pending changes and refresh the reader
    pub fn commit(&self) -> Result<(), KeywordIndexError> {
        let mut writer = self.writer.lock().map_err(|_| KeywordIndexError::LockPoisoned)?;
        writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// Clear the entire index
    pub fn clear(&self) -> Result<(), KeywordIndexError> {
        {
            let writer = self.writer.lock().map_err(|_| KeywordIndexError::LockPoisoned)?;
            writer
                .delete_all_documents()
                .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        }
        self.commit()
    }

    /// Number of committed chunks
    pub fn count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Turn free text into a disjunction of significant terms
    ///
    /// Returns `None` when nothing searchable remains.
    pub fn build_query(&self, query: &str) -> Option<String> {
        let cleaned = self.sanitizer.replace_all(query, " ");
        let terms: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|term| !OPERATORS.contains(term))
            .collect();

        if terms.is_empty() {
            return None;
        }

        let significant: Vec<&str> = terms
            .iter()
            .copied()
            .filter(|term| !STOP_WORDS.contains(&term.to_lowercase().as_str()))
            .collect();

        // A query made only of stop words still searches for them
        let chosen = if significant.is_empty() {
            terms
        } else {
            significant
        };

        Some(chosen.join(" OR "))
    }

    /// Search the index
    ///
    /// # Arguments
    /// * `query` - Free text; operator syntax is neutralised before parsing
    /// * `limit` - Maximum number of results
    ///
    /// # Returns
    /// Results sorted by BM25 score, best first
    pub fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KeywordSearchResult>, KeywordIndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(query_text) = self.build_query(query) else {
            return Ok(Vec::new());
        };

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.content, self.fields.file_name, self.fields.people],
        );
        let parsed = match query_parser.parse_query(&query_text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Keyword query '{}' failed to parse: {}", query_text, e);
                return Ok(Vec::new());
            }
        };

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            match self.to_chunk(&retrieved) {
                Some(chunk) => results.push(KeywordSearchResult { chunk, score }),
                None => tracing::warn!("Skipping keyword document without an id"),
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated() -> KeywordIndex {
        let index = KeywordIndex::in_memory().unwrap();
        index
            .add_or_update_batch(&[
                Chunk::for_file("/vault/fox.md", 0, "The quick brown fox jumps over the lazy dog"),
                Chunk::for_file("/vault/fox.md", 1, "A fast red fox leaps above a sleepy canine"),
                Chunk::for_file("/vault/code.md", 0, "Python programming language tutorial"),
            ])
            .unwrap();
        index.commit().unwrap();
        index
    }

    #[test]
    fn test_index_creation() {
        let temp = TempDir::new().unwrap();
        let index = KeywordIndex::new(temp.path().join("keywords")).unwrap();
        assert_eq!(index.count(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = populated();
        assert_eq!(index.count(), 3);

        let results = index.search("fox", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| r.chunk.file_path == "/vault/fox.md"));

        let results = index.search("python", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "/vault/code.md::0");
        assert_eq!(results[0].chunk.chunk_index, Some(0));
    }

    #[test]
    fn test_operator_syntax_is_neutralised() {
        let index = populated();

        assert!(index.search("fox AND (\"dog", 10).is_ok());
        assert!(index.search("title:python -fox", 10).unwrap().len() >= 2);
        assert!(index.search("?!*", 10).unwrap().is_empty());
        assert!(index.search("", 10).unwrap().is_empty());
    }

    #[test]
    fn test_build_query() {
        let index = KeywordIndex::in_memory().unwrap();
        assert_eq!(
            index.build_query("What is Jane's KTN?").as_deref(),
            Some("Jane OR s OR KTN")
        );
        assert_eq!(index.build_query("the of").as_deref(), Some("the OR of"));
        assert_eq!(index.build_query("NOT AND"), None);
    }

    #[test]
    fn test_update_replaces_previous_version() {
        let index = populated();
        index
            .add_or_update(&Chunk::for_file("/vault/code.md", 0, "Rust ownership notes"))
            .unwrap();
        index.commit().unwrap();

        assert_eq!(index.count(), 3);
        assert!(index.search("python", 10).unwrap().is_empty());
        assert_eq!(index.search("ownership", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_people_and_file_name_are_searchable() {
        let index = KeywordIndex::in_memory().unwrap();
        index
            .add_or_update(
                &Chunk::for_file("/vault/People/Jane.md", 0, "renewal notes")
                    .with_people(vec!["Jane".to_string()])
                    .with_modified_date("2025-01-02"),
            )
            .unwrap();
        index.commit().unwrap();

        let results = index.search("jane", 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.people, vec!["Jane".to_string()]);
        assert_eq!(results[0].chunk.modified_date.as_deref(), Some("2025-01-02"));
        assert_eq!(results[0].chunk.file_name, "Jane.md");
    }

    #[test]
    fn test_reload() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("keywords");

        {
            let index = KeywordIndex::new(index_path.clone()).unwrap();
            index.add_or_update(&Chunk::new("doc::0", "Test document")).unwrap();
            index.commit().unwrap();
        }

        let index = KeywordIndex::new(index_path).unwrap();
        assert_eq!(index.count(), 1);
        assert_eq!(index.search("test", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_and_clear() {
        let index = populated();

        index.delete("/vault/fox.md::0").unwrap();
        index.commit().unwrap();
        assert_eq!(index.count(), 2);

        index.clear().unwrap();
        assert!(index.is_empty());
    }
}
