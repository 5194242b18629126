//! Keyword search over durable memory.
//!
//! Case-insensitive substring matching against each value's flat text
//! rendering ([`MemoryValue::to_search_text`]). There is no index; every candidate key is read and scanned.

use nebula_types::error::RepositoryError;
use nebula_types::memory::SearchMatch;
use nebula_types::value::MemoryValue;

use super::store::DurableStore;
use super::versioned::VersionedStore;

/// A normalized keyword query.
///
/// Terms are lower-cased, trimmed, and deduplicated (first occurrence wins).
/// Empty terms are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordQuery {
    terms: Vec<String>,
}

impl KeywordQuery {
    pub fn new<T: AsRef<str>>(terms: &[T]) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(terms.len());
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !normalized.contains(&term) {
                normalized.push(term);
            }
        }
        Self { terms: normalized }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Score a single value. Returns the matched terms and relevance, or
    /// `None` when nothing matches.
    pub fn score(&self, value: &MemoryValue) -> Option<(Vec<String>, f64)> {
        if self.terms.is_empty() {
            return None;
        }

        let haystack = value.to_search_text().to_lowercase();
        let matched: Vec<String> = self
            .terms
            .iter()
            .filter(|t| haystack.contains(t.as_str()))
            .cloned()
            .collect();

        if matched.is_empty() {
            return None;
        }
        let relevance = matched.len() as f64 / self.terms.len() as f64;
        Some((matched, relevance))
    }

    /// Scan `candidate_keys` in order and return every key whose current
    /// value contains at least one term. Missing keys are skipped.
    pub async fn search<S, K>(
        &self,
        store: &VersionedStore<S>,
        candidate_keys: &[K],
    ) -> Result<Vec<SearchMatch>, RepositoryError>
    where
        S: DurableStore,
        K: AsRef<str>,
    {
        let mut results = Vec::new();
        if self.terms.is_empty() {
            return Ok(results);
        }

        for key in candidate_keys {
            let key = key.as_ref();
            let Some(value) = store.get(key).await? else {
                continue;
            };
            if let Some((matched_terms, relevance)) = self.score(&value) {
                results.push(SearchMatch {
                    key: key.to_string(),
                    value,
                    matched_terms,
                    relevance,
                });
            }
        }

        Ok(results)
    }
}
