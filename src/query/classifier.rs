use crate::identity::{is_apostrophe, strip_possessive, AliasTable};
use crate::query::QueryKind;
use regex::Regex;
use std::sync::Arc;

/// Words that mark an identifier lookup
pub const IDENTIFIER_KEYWORDS: &[&str] = &[
    "passport", "ktn", "ssn", "phone", "email", "address", "birthday", "number", "id", "code",
    "pin", "account",
];

/// Verbs asking for synthesis rather than lookup
pub const ACTION_VERBS: &[&str] = &[
    "prepare",
    "summarize",
    "brief",
    "analyze",
    "review",
    "explain",
    "describe",
    "tell",
    "help",
    "find",
    "show",
];

/// Words asking which documents cover a topic
pub const DISCOVERY_WORDS: &[&str] = &[
    "files",
    "documents",
    "notes",
    "about",
    "regarding",
    "related",
    "discuss",
    "mention",
    "contain",
    "cover",
];

const SHORT_QUERY_WORDS: usize = 5;
const LONG_QUERY_WORDS: usize = 8;

/// Labels queries `factual` or `semantic`
///
/// Rules are evaluated in order and the first match wins:
/// 1. `<name>'s <identifier>` is factual
/// 2. a known identity in a query of at most five words is factual
/// 3. an identifier keyword in a query of at most five words is factual
/// 4. a synthesis verb is semantic
/// 5. a discovery word is semantic
/// 6. more than eight words is semantic
/// 7. anything else is factual
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    aliases: Arc<AliasTable>,
    possessive: Regex,
}

impl QueryClassifier {
    pub fn new(aliases: Arc<AliasTable>) -> Result<Self, regex::Error> {
        let possessive = Regex::new(r"(\w+)['\x{2019}]s\s+(\w+)")?;
        Ok(Self {
            aliases,
            possessive,
        })
    }

    pub fn classify(&self, query: &str) -> QueryKind {
        let lower = query.to_lowercase();
        let raw_words: Vec<&str> = lower.split_whitespace().collect();
        let words: Vec<&str> = raw_words.iter().map(|w| clean_word(w)).collect();
        let short = words.len() <= SHORT_QUERY_WORDS;

        for captures in self.possessive.captures_iter(&lower) {
            if let Some(following) = captures.get(2) {
                if IDENTIFIER_KEYWORDS.contains(&following.as_str()) {
                    tracing::debug!("Factual: possessive + identifier '{}'", following.as_str());
                    return QueryKind::Factual;
                }
            }
        }

        if short {
            if let Some(name) = raw_words.iter().find_map(|w| self.aliases.lookup(w)) {
                tracing::debug!("Factual: short query with known identity '{}'", name);
                return QueryKind::Factual;
            }

            if words.iter().any(|w| IDENTIFIER_KEYWORDS.contains(w)) {
                tracing::debug!("Factual: identifier keyword in short query");
                return QueryKind::Factual;
            }
        }

        if words.iter().any(|w| ACTION_VERBS.contains(w)) {
            tracing::debug!("Semantic: action verb detected");
            return QueryKind::Semantic;
        }

        if words.iter().any(|w| DISCOVERY_WORDS.contains(w)) {
            tracing::debug!("Semantic: discovery word detected");
            return QueryKind::Semantic;
        }

        if words.len() > LONG_QUERY_WORDS {
            tracing::debug!("Semantic: long query ({} words)", words.len());
            return QueryKind::Semantic;
        }

        tracing::debug!("Factual: default for ambiguous query");
        QueryKind::Factual
    }
}

fn clean_word(word: &str) -> &str {
    let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && !is_apostrophe(c));
    strip_possessive(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> QueryClassifier {
        let aliases = AliasTable::from_people([("Jane", vec!["Janie"]), ("Alex", vec!["Al"])]);
        QueryClassifier::new(Arc::new(aliases)).unwrap()
    }

    #[test]
    fn test_possessive_identifier_is_factual() {
        let c = classifier();
        assert_eq!(c.classify("Jane's KTN"), QueryKind::Factual);
        assert_eq!(c.classify("my brother's passport"), QueryKind::Factual);
        assert_eq!(
            c.classify("could you please look up what my landlord\u{2019}s email was last spring"),
            QueryKind::Factual
        );
    }

    #[test]
    fn test_known_identity_in_short_query() {
        let c = classifier();
        assert_eq!(c.classify("summarize Al"), QueryKind::Factual);
        assert_eq!(
            c.classify("summarize everything Alex said in the offsite planning doc"),
            QueryKind::Semantic
        );
    }

    #[test]
    fn test_identifier_keyword_in_short_query() {
        assert_eq!(classifier().classify("wifi code?"), QueryKind::Factual);
    }

    #[test]
    fn test_action_and_discovery_words() {
        let c = classifier();
        assert_eq!(c.classify("prepare me for the board meeting"), QueryKind::Semantic);
        assert_eq!(c.classify("what files discuss budget"), QueryKind::Semantic);
    }

    #[test]
    fn test_long_queries_are_semantic() {
        assert_eq!(
            classifier().classify("what did we decide last year on the kitchen remodel plan"),
            QueryKind::Semantic
        );
    }

    #[test]
    fn test_default_is_factual() {
        assert_eq!(classifier().classify("q3 budget"), QueryKind::Factual);
        assert_eq!(classifier().classify(""), QueryKind::Factual);
    }
}
