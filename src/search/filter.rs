//! Attribute filters and the filter composer.
//!
//! Vector-store queries are narrowed by a filter tree: bare comparisons
//! (`key op value`) or `and`/`or` compounds of sub-filters. The composer
//! combines three independent sources into one tree:
//!
//! 1. the caller's base filter from the tool definition,
//! 2. the structured filter map the decision LLM proposes each iteration,
//! 3. exclusion clauses removing chunk ids already seen.
//!
//! LLM filter maps translate structurally: scalars become `eq` comparisons,
//! nested objects become dotted-path comparisons ANDed together, and arrays
//! become an OR of `eq`s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Comparison operators supported by the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

/// A single attribute condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonFilter {
    /// Operator.
    #[serde(rename = "type")]
    pub op: ComparisonOp,
    /// Attribute key (dotted paths address nested attributes).
    pub key: String,
    /// Comparison value.
    pub value: Value,
}

/// Boolean connectives over sub-filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundOp {
    /// All sub-filters must hold.
    And,
    /// Any sub-filter may hold.
    Or,
}

/// A compound of sub-filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundFilter {
    /// Connective.
    #[serde(rename = "type")]
    pub op: CompoundOp,
    /// Operands.
    pub filters: Vec<Filter>,
}

/// A filter tree: a bare comparison or a compound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    /// Single condition.
    Comparison(ComparisonFilter),
    /// `and`/`or` of conditions.
    Compound(CompoundFilter),
}

impl Filter {
    /// Creates a single comparison.
    pub fn comparison(key: impl Into<String>, op: ComparisonOp, value: Value) -> Self {
        Filter::Comparison(ComparisonFilter {
            op,
            key: key.into(),
            value,
        })
    }

    /// Creates an equality comparison.
    pub fn eq(key: impl Into<String>, value: Value) -> Self {
        Self::comparison(key, ComparisonOp::Eq, value)
    }

    /// ANDs filters together, flattening the degenerate cases: zero operands
    /// yield `None`, one operand yields itself.
    pub fn and_all(mut filters: Vec<Filter>) -> Option<Filter> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::Compound(CompoundFilter {
                op: CompoundOp::And,
                filters,
            })),
        }
    }

    /// ORs filters together with the same degenerate-case flattening.
    pub fn or_all(mut filters: Vec<Filter>) -> Option<Filter> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::Compound(CompoundFilter {
                op: CompoundOp::Or,
                filters,
            })),
        }
    }

    /// Whether the tree contains a comparison on `key`.
    pub fn mentions_key(&self, key: &str) -> bool {
        match self {
            Filter::Comparison(cmp) => cmp.key == key,
            Filter::Compound(compound) => compound.filters.iter().any(|f| f.mentions_key(key)),
        }
    }
}

/// Translates the decision LLM's filter map into a filter tree.
///
/// Scalars become `eq`, nested objects become dotted-path comparisons ANDed
/// together, arrays become an OR of `eq`s. An empty map yields `None`.
pub fn from_llm_map(map: &Map<String, Value>) -> Option<Filter> {
    let mut clauses = Vec::new();
    collect_llm_clauses(None, map, &mut clauses);
    Filter::and_all(clauses)
}

fn collect_llm_clauses(prefix: Option<&str>, map: &Map<String, Value>, out: &mut Vec<Filter>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => collect_llm_clauses(Some(&path), nested, out),
            Value::Array(values) => {
                let options: Vec<Filter> = values
                    .iter()
                    .map(|v| Filter::eq(path.clone(), v.clone()))
                    .collect();
                if let Some(filter) = Filter::or_all(options) {
                    out.push(filter);
                }
            }
            scalar => out.push(Filter::eq(path, scalar.clone())),
        }
    }
}

/// Builds the exclusion filter removing already-seen chunk ids: a single
/// `ne` clause, or an AND of many.
pub fn exclusion_filter(chunk_ids: &[String]) -> Option<Filter> {
    let clauses: Vec<Filter> = chunk_ids
        .iter()
        .map(|id| Filter::comparison("chunk_id", ComparisonOp::Ne, Value::String(id.clone())))
        .collect();
    Filter::and_all(clauses)
}

/// Combines the user's base filter with the LLM's proposed map (AND), without
/// exclusions. This is the "applied filter" recorded on an iteration.
pub fn compose_base(user: Option<&Filter>, llm: Option<&Map<String, Value>>) -> Option<Filter> {
    let mut parts = Vec::new();
    if let Some(user) = user {
        parts.push(user.clone());
    }
    if let Some(filter) = llm.and_then(from_llm_map) {
        parts.push(filter);
    }
    Filter::and_all(parts)
}

/// Combines user filter, LLM filter, and exclusion clauses into the filter
/// actually sent to the vector store.
pub fn compose(
    user: Option<&Filter>,
    llm: Option<&Map<String, Value>>,
    excluded_chunk_ids: &[String],
) -> Option<Filter> {
    let mut parts = Vec::new();
    if let Some(base) = compose_base(user, llm) {
        parts.push(base);
    }
    if let Some(exclusion) = exclusion_filter(excluded_chunk_ids) {
        parts.push(exclusion);
    }
    Filter::and_all(parts)
}

/// Whether an LLM filter map uses `chunk_index` without pinning `filename`.
/// Such filters are rejected and retried: a chunk index is meaningless
/// without the file it indexes into.
pub fn chunk_index_without_filename(map: &Map<String, Value>) -> bool {
    map.contains_key("chunk_index") && !map.contains_key("filename")
}
