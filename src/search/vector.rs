//! Vector-store client seam and the retrieved-chunk data model.
//!
//! The gateway does not own an index; it queries per-store similarity search
//! through [`VectorStoreClient`] and post-processes the results: chunks are
//! deduplicated by `(file id, normalized content)` keeping the best-scoring
//! copy, and sorted by descending score.

use crate::Result;
use crate::search::filter::Filter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Source file id.
    pub file_id: String,
    /// Source filename.
    pub filename: String,
    /// Similarity score (higher is closer).
    pub score: f64,
    /// Chunk text.
    pub content: String,
    /// Attribute map; may include `chunk_id` and `chunk_index`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Value>,
}

impl SearchResult {
    /// The chunk id attribute, when the store provides one.
    pub fn chunk_id(&self) -> Option<&str> {
        self.attributes.get("chunk_id").and_then(Value::as_str)
    }

    /// Deduplication key: file id plus whitespace-normalized content.
    pub fn dedup_key(&self) -> (String, String) {
        (self.file_id.clone(), normalize_content(&self.content))
    }
}

/// Collapses whitespace runs and trims, so chunks that differ only in
/// formatting dedupe together.
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A similarity query against one store.
#[derive(Debug, Clone, Serialize)]
pub struct VectorQuery {
    /// Query text.
    pub query: String,
    /// Result cap for this store.
    pub max_num_results: usize,
    /// Attribute filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filter>,
}

/// One page of store results.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VectorSearchPage {
    /// Retrieved chunks, store-ranked.
    pub data: Vec<SearchResult>,
}

/// Per-store similarity search, the external contract of spec'd stores.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    /// Runs one similarity query against `store_id`.
    async fn search(&self, store_id: &str, query: &VectorQuery) -> Result<VectorSearchPage>;
}

/// Deduplicates by [`SearchResult::dedup_key`] keeping the max-score copy,
/// then sorts by descending score.
pub fn dedup_and_rank(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut best: HashMap<(String, String), SearchResult> = HashMap::new();
    for result in results {
        let key = result.dedup_key();
        match best.get(&key) {
            Some(existing) if existing.score >= result.score => {}
            _ => {
                best.insert(key, result);
            }
        }
    }
    let mut ranked: Vec<SearchResult> = best.into_values().collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn result(file_id: &str, content: &str, score: f64) -> SearchResult {
        SearchResult {
            file_id: file_id.to_string(),
            filename: format!("{file_id}.pdf"),
            score,
            content: content.to_string(),
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn test_normalize_content_collapses_whitespace() {
        assert_eq!(normalize_content("  a \n b\t c  "), "a b c");
        assert_eq!(normalize_content("a b c"), "a b c");
    }

    #[test]
    fn test_dedup_keeps_max_score_copy() {
        let ranked = dedup_and_rank(vec![
            result("f1", "same chunk", 0.4),
            result("f1", "same  chunk", 0.9),
            result("f2", "same chunk", 0.5),
        ]);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].file_id, "f1");
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!(ranked[1].file_id, "f2");
    }

    #[test]
    fn test_dedup_sorts_descending() {
        let ranked = dedup_and_rank(vec![
            result("f1", "a", 0.1),
            result("f2", "b", 0.8),
            result("f3", "c", 0.5),
        ]);
        let scores: Vec<f64> = ranked.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.8, 0.5, 0.1]);
    }

    #[test]
    fn test_chunk_id_accessor() {
        let mut r = result("f1", "a", 0.5);
        assert!(r.chunk_id().is_none());
        r.attributes
            .insert("chunk_id".to_string(), serde_json::json!("c1"));
        assert_eq!(r.chunk_id(), Some("c1"));
    }
}
