//! Identity alias table
//!
//! Maps nicknames and canonical names (case-insensitively) to the canonical
//! identity used in file names and chunk metadata. The same table backs query
//! expansion, the filename boost and the query classifier.

use crate::error::{RecollectError, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Tokens shorter than this are never treated as aliases
pub const MIN_ALIAS_LEN: usize = 2;

/// Starter people file written by `recollect config init`
pub const PEOPLE_TEMPLATE: &str = include_str!("../../config-templates/people.toml");

const POSSESSIVE_SUFFIXES: [&str; 6] = ["'s", "\u{2019}s", "`s", "'", "\u{2019}", "`"];

/// On-disk people file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeopleFile {
    #[serde(default)]
    pub people: BTreeMap<String, PersonEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonEntry {
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Case-insensitive alias → canonical identity lookup
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: AHashMap<String, String>,
    canonical: Vec<String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(canonical, aliases)` pairs
    pub fn from_people<I, S, A>(people: I) -> Self
    where
        I: IntoIterator<Item = (S, A)>,
        S: Into<String>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let mut table = Self::new();
        for (canonical, aliases) in people {
            let canonical = canonical.into();
            table.insert(&canonical, &canonical);
            for alias in aliases {
                table.insert(&canonical, alias.as_ref());
            }
        }
        table
    }

    /// Parse a people file from TOML text
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: PeopleFile = toml::from_str(content)?;
        Ok(Self::from_people(
            file.people
                .into_iter()
                .map(|(name, entry)| (name, entry.aliases)),
        ))
    }

    /// Load the people file, treating a missing file as an empty table
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "People file {:?} not found, alias expansion disabled",
                path
            );
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path).map_err(|e| RecollectError::Io {
            source: e,
            context: format!("Failed to read people file: {:?}", path),
        })?;

        let table = Self::from_toml_str(&content).map_err(|e| RecollectError::PeopleFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        tracing::info!(
            "Loaded {} identities ({} aliases) from {:?}",
            table.canonical.len(),
            table.aliases.len(),
            path
        );
        Ok(table)
    }

    /// Register `alias` for `canonical`. Short or already-claimed aliases are skipped.
    pub fn insert(&mut self, canonical: &str, alias: &str) {
        let key = normalize_token(alias);
        if key.chars().count() < MIN_ALIAS_LEN {
            return;
        }

        if !self.canonical.iter().any(|c| c == canonical) {
            self.canonical.push(canonical.to_string());
        }

        match self.aliases.get(&key) {
            Some(existing) if existing != canonical => {
                tracing::warn!(
                    "Alias '{}' already maps to '{}', ignoring '{}'",
                    alias,
                    existing,
                    canonical
                );
            }
            Some(_) => {}
            None => {
                self.aliases.insert(key, canonical.to_string());
            }
        }
    }

    /// Resolve a raw query token to its canonical identity
    pub fn lookup(&self, token: &str) -> Option<&str> {
        self.lookup_normalized(&normalize_token(token))
    }

    /// Resolve an already normalized key
    pub fn lookup_normalized(&self, key: &str) -> Option<&str> {
        if key.chars().count() < MIN_ALIAS_LEN {
            return None;
        }
        self.aliases.get(key).map(String::as_str)
    }

    pub fn canonical_names(&self) -> &[String] {
        &self.canonical
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

pub(crate) fn is_apostrophe(c: char) -> bool {
    matches!(c, '\'' | '\u{2019}' | '`')
}

/// Strip a trailing possessive (`'s`, `’s` or a bare apostrophe)
pub fn strip_possessive(word: &str) -> &str {
    POSSESSIVE_SUFFIXES
        .iter()
        .find_map(|suffix| word.strip_suffix(suffix))
        .unwrap_or(word)
}

/// Lower-case, drop surrounding punctuation and possessive, keep alphanumerics
pub fn normalize_token(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let trimmed = lower.trim_matches(|c: char| !c.is_alphanumeric() && !is_apostrophe(c));
    strip_possessive(trimmed)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AliasTable {
        AliasTable::from_people([("Alex", vec!["Al", "Lex"]), ("Jane", vec!["J"])])
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = table();
        assert_eq!(table.lookup("AL"), Some("Alex"));
        assert_eq!(table.lookup("alex"), Some("Alex"));
        assert_eq!(table.lookup("Lex's"), Some("Alex"));
        assert_eq!(table.lookup("jane?"), Some("Jane"));
        assert_eq!(table.lookup("bob"), None);
    }

    #[test]
    fn test_short_aliases_are_ignored() {
        let table = table();
        assert_eq!(table.lookup("j"), None);
        assert_eq!(table.canonical_names(), ["Alex".to_string(), "Jane".to_string()]);
    }

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("Al's"), "al");
        assert_eq!(normalize_token("Al\u{2019}s,"), "al");
        assert_eq!(normalize_token("(Jane)"), "jane");
        assert_eq!(normalize_token("AB12-CD"), "ab12cd");
    }

    #[test]
    fn test_parse_people_file() {
        let table = AliasTable::from_toml_str(
            r#"
            [people.Alex]
            aliases = ["Al"]

            [people.Taylor]
            "#,
        )
        .unwrap();

        assert_eq!(table.lookup("al"), Some("Alex"));
        assert_eq!(table.lookup("taylor"), Some("Taylor"));
    }

    #[test]
    fn test_bundled_template_parses() {
        let table = AliasTable::from_toml_str(PEOPLE_TEMPLATE).unwrap();
        assert_eq!(table.lookup("Al's"), Some("Alex"));
        assert_eq!(table.lookup("janey"), Some("Jane"));
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let temp = tempfile::TempDir::new().unwrap();
        let table = AliasTable::load(&temp.path().join("people.toml")).unwrap();
        assert!(table.is_empty());
    }
}
