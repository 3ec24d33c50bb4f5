use crate::domain::BookSummary;
use std::fmt;
use std::sync::Arc;

/// A trimmed, case-folded query string; the cache and coalescing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    /// Normalizes raw input, returning `None` when it is shorter than `min_len` characters.
    pub fn normalize(raw: &str, min_len: usize) -> Option<QueryKey> {
        let folded = raw.trim().to_lowercase();
        if folded.chars().count() < min_len {
            return None;
        }
        Some(QueryKey(folded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a single [`crate::search::SearchCache::search`] call ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Results from the cache or a completed lookup.
    Results(Arc<Vec<BookSummary>>),
    /// Input too short; nothing was sent.
    NotSearched,
    /// A newer keystroke or request replaced this one.
    Superseded,
}

impl SearchOutcome {
    /// The results, empty unless the call produced some.
    pub fn results(&self) -> &[BookSummary] {
        match self {
            SearchOutcome::Results(results) => results,
            SearchOutcome::NotSearched | SearchOutcome::Superseded => &[],
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, SearchOutcome::Superseded)
    }
}

/// The view-facing search state: loading, results, and whether a search ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    pub query: String,
    pub loading: bool,
    pub results: Arc<Vec<BookSummary>>,
    pub searched: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_folds() {
        let key = QueryKey::normalize("  The HOBBIT ", 2).unwrap();
        assert_eq!(key.as_str(), "the hobbit");
        assert_eq!(QueryKey::normalize("the hobbit", 2), Some(key));
    }

    #[test]
    fn short_input_is_not_a_query() {
        assert_eq!(QueryKey::normalize("  a  ", 2), None);
        assert_eq!(QueryKey::normalize("", 2), None);
        assert!(QueryKey::normalize("ab", 2).is_some());
        // Length is counted in characters, not bytes.
        assert_eq!(QueryKey::normalize("é", 2), None);
    }
}
