//! Query preprocessing and intent classification
//!
//! Every search starts by expanding identity aliases in the raw query and
//! labelling it `factual` or `semantic`. The label decides whether the top
//! keyword matches are protected from cross-encoder reordering.

mod classifier;
mod preprocess;

pub use classifier::{QueryClassifier, ACTION_VERBS, DISCOVERY_WORDS, IDENTIFIER_KEYWORDS};
pub use preprocess::{identity_tokens, QueryPreprocessor};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classifier label for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Exact lookup (names, identifiers): top keyword hits are protected
    Factual,
    /// Exploratory or conceptual: full cross-encoder reranking
    Semantic,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Factual => write!(f, "factual"),
            QueryKind::Semantic => write!(f, "semantic"),
        }
    }
}

/// Per-call view of a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContext {
    pub raw: String,
    pub expanded: String,
    pub kind: QueryKind,
}

impl QueryContext {
    pub fn was_expanded(&self) -> bool {
        self.raw != self.expanded
    }
}
