use crate::identity::{is_apostrophe, normalize_token, AliasTable};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Rewrites nicknames in a query to their canonical identity
///
/// `"Al's phone"` becomes `"Alex's phone"`, and `"als phone"` resolves the
/// same way because stripping the trailing `s` yields a known alias.
#[derive(Debug, Clone)]
pub struct QueryPreprocessor {
    aliases: Arc<AliasTable>,
}

impl QueryPreprocessor {
    pub fn new(aliases: Arc<AliasTable>) -> Self {
        Self { aliases }
    }

    /// Expand aliases, leaving whitespace and unresolved tokens untouched
    pub fn expand(&self, query: &str) -> String {
        let mut expanded = String::with_capacity(query.len() + 16);

        for piece in query.split_inclusive(char::is_whitespace) {
            let token = piece.trim_end_matches(char::is_whitespace);
            let trailing_ws = &piece[token.len()..];

            match self.expand_token(token) {
                Some(replacement) => expanded.push_str(&replacement),
                None => expanded.push_str(token),
            }
            expanded.push_str(trailing_ws);
        }

        expanded
    }

    fn expand_token(&self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }

        let body_start = token
            .char_indices()
            .find(|(_, c)| c.is_alphanumeric())
            .map(|(i, _)| i)?;
        let body_end = token
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_alphanumeric() || is_apostrophe(*c))
            .map(|(i, c)| i + c.len_utf8())?;
        if body_end <= body_start {
            return None;
        }

        let (prefix, rest) = token.split_at(body_start);
        let (body, suffix) = rest.split_at(body_end - body_start);

        let key = normalize_token(body);
        let apostrophe = possessive_apostrophe(body);

        let (canonical, possessive) = if let Some(canonical) = self.aliases.lookup_normalized(&key)
        {
            (canonical, apostrophe)
        } else if key.chars().count() >= 3 && key.ends_with('s') && apostrophe.is_none() {
            let stem = &key[..key.len() - 1];
            (self.aliases.lookup_normalized(stem)?, Some('\''))
        } else {
            return None;
        };

        let mut out = String::with_capacity(token.len() + canonical.len());
        out.push_str(prefix);
        out.push_str(canonical);
        if let Some(mark) = possessive {
            out.push(mark);
            out.push('s');
        }
        out.push_str(suffix);
        Some(out)
    }
}

/// Apostrophe used by a possessive `'s` ending, if any
fn possessive_apostrophe(body: &str) -> Option<char> {
    let lower = body.to_lowercase();
    let mut tail = lower.chars().rev();
    match (tail.next(), tail.next()) {
        (Some('s'), Some(mark)) if is_apostrophe(mark) => Some(mark),
        _ => None,
    }
}

/// Canonical identities (lower-cased) named in an already expanded query
pub fn identity_tokens(expanded: &str, aliases: &AliasTable) -> BTreeSet<String> {
    expanded
        .split_whitespace()
        .filter_map(|word| aliases.lookup(word))
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor() -> QueryPreprocessor {
        QueryPreprocessor::new(Arc::new(AliasTable::from_people([
            ("Alex", vec!["Al", "Lex"]),
            ("Taylor", vec!["Tay"]),
        ])))
    }

    #[test]
    fn test_expands_plain_alias() {
        assert_eq!(preprocessor().expand("call al today"), "call Alex today");
    }

    #[test]
    fn test_preserves_possessive() {
        let p = preprocessor();
        assert_eq!(p.expand("What is Al's phone?"), "What is Alex's phone?");
        assert_eq!(p.expand("Tay\u{2019}s passport"), "Taylor\u{2019}s passport");
    }

    #[test]
    fn test_bare_possessive_without_apostrophe() {
        let p = preprocessor();
        assert_eq!(p.expand("als birthday"), "Alex's birthday");
        assert_eq!(p.expand("tays ktn"), "Taylor's ktn");
    }

    #[test]
    fn test_keeps_surrounding_punctuation() {
        assert_eq!(preprocessor().expand("(al), lex?"), "(Alex), Alex?");
    }

    #[test]
    fn test_unknown_and_short_tokens_pass_through() {
        let p = preprocessor();
        assert_eq!(p.expand("is a  budget"), "is a  budget");
        assert_eq!(p.expand(""), "");
    }

    #[test]
    fn test_identity_tokens() {
        let aliases = AliasTable::from_people([("Alex", vec!["Al"]), ("Jane", vec![])]);
        let tokens = identity_tokens("Alex's notes with Jane", &aliases);
        assert_eq!(
            tokens.into_iter().collect::<Vec<_>>(),
            vec!["alex".to_string(), "jane".to_string()]
        );
    }
}
