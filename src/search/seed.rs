//! Seed strategies: the initial candidate fetch for a search run.
//!
//! Two variants ship: `default` (pure dense similarity, store ranking kept
//! as-is) and `hybrid` (dense blended with an in-process lexical term-overlap
//! score at mixing parameter α, where 1.0 is dense-only). Unknown strategy
//! names fall back to `default`.

use crate::Result;
use crate::search::filter::Filter;
use crate::search::vector::{
    SearchResult, VectorQuery, VectorStoreClient, dedup_and_rank,
};
use tracing::warn;

/// The initial-retrieval strategy for a search run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeedStrategy {
    /// Pure dense similarity.
    Default,
    /// Dense blended with lexical overlap at α (1.0 = dense only).
    Hybrid {
        /// Mixing parameter in `[0, 1]`.
        alpha: f64,
    },
}

impl SeedStrategy {
    /// Resolves a strategy by name. Unknown names fall back to `default`.
    pub fn from_name(name: Option<&str>, alpha: f64) -> Self {
        match name {
            None => SeedStrategy::Default,
            Some("default") => SeedStrategy::Default,
            Some("hybrid") => SeedStrategy::Hybrid {
                alpha: alpha.clamp(0.0, 1.0),
            },
            Some(other) => {
                warn!(strategy = other, "unknown seed strategy, using default");
                SeedStrategy::Default
            }
        }
    }

    /// Produces the initial candidate set: fan out over `store_ids`, rescore
    /// per the strategy, dedupe, sort by descending score, truncate to `k`.
    ///
    /// A failing store is logged and skipped; the other stores' results are
    /// kept.
    pub async fn seed(
        &self,
        client: &dyn VectorStoreClient,
        store_ids: &[String],
        query: &str,
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>> {
        let vector_query = VectorQuery {
            query: query.to_string(),
            max_num_results: k,
            filters: filter.cloned(),
        };

        let mut collected = Vec::new();
        for store_id in store_ids {
            match client.search(store_id, &vector_query).await {
                Ok(page) => collected.extend(page.data),
                Err(e) => {
                    warn!(store_id = %store_id, error = %e, "seed query failed for store");
                }
            }
        }

        if let SeedStrategy::Hybrid { alpha } = self {
            for result in &mut collected {
                let lexical = lexical_overlap(query, &result.content);
                result.score = alpha * result.score + (1.0 - alpha) * lexical;
            }
        }

        let mut ranked = dedup_and_rank(collected);
        ranked.truncate(k);
        Ok(ranked)
    }
}

/// Fraction of distinct query terms present in the content, case-folded.
fn lexical_overlap(query: &str, content: &str) -> f64 {
    let content = content.to_lowercase();
    let terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}
