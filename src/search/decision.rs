//! Parser for the decision LLM's replies.
//!
//! Each decision is a free-text reply containing one directive line:
//!
//! ```text
//! TERMINATE: enough evidence gathered
//! NEXT_QUERY:throughput tuning {"filename": "perf.pdf"} ##MEMORY## checked ch. 3
//! ```
//!
//! `NEXT_QUERY` lines are parsed as `NEXT_QUERY:<prefix>{<json>}<suffix>`:
//! the braced object is the filter map, any text around it belongs to the
//! query, and anything after `##MEMORY##` is captured as the knowledge-memory
//! payload. The raw line is preserved by the caller so memory markers survive
//! in the iteration history.

use crate::{Error, Result};
use serde_json::{Map, Value};

/// Marker separating a query from its memory payload.
pub const MEMORY_MARKER: &str = "##MEMORY##";

/// A parsed decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Stop searching.
    Terminate {
        /// Concluding remark, when the model gave one.
        conclusion: Option<String>,
    },
    /// Search again with a refined query.
    NextQuery {
        /// The refined query text (memory marker stripped).
        query: String,
        /// The proposed filter map, when one was supplied.
        filters: Option<Map<String, Value>>,
        /// Knowledge-memory payload after `##MEMORY##`.
        memory: Option<String>,
        /// The full directive line as the model wrote it.
        raw: String,
    },
}

/// Parses a raw LLM reply into a [`Decision`].
///
/// # Errors
///
/// Returns a parse failure when no directive line is found or the embedded
/// filter JSON is malformed; the engine translates that into a retry.
pub fn parse_decision(reply: &str) -> Result<Decision> {
    for line in reply.lines() {
        let line = line.trim();
        if line.starts_with("TERMINATE") {
            let conclusion = line
                .strip_prefix("TERMINATE")
                .map(|rest| rest.trim_start_matches(':').trim())
                .filter(|rest| !rest.is_empty())
                .map(str::to_string);
            return Ok(Decision::Terminate { conclusion });
        }
        if let Some(rest) = line.strip_prefix("NEXT_QUERY:") {
            return parse_next_query(line, rest);
        }
    }
    Err(Error::parse_failure(format!(
        "no TERMINATE or NEXT_QUERY directive in reply: {}",
        truncate(reply, 120)
    )))
}

fn parse_next_query(raw: &str, rest: &str) -> Result<Decision> {
    let (query_text, filters) = match find_json_object(rest) {
        Some((start, end)) => {
            let json = &rest[start..end];
            let filters: Map<String, Value> = serde_json::from_str(json).map_err(|e| {
                Error::parse_failure(format!("malformed filter JSON `{json}`: {e}"))
            })?;
            let mut query = rest[..start].trim().to_string();
            let suffix = rest[end..].trim();
            if !suffix.is_empty() {
                if !query.is_empty() {
                    query.push(' ');
                }
                query.push_str(suffix);
            }
            (query, Some(filters))
        }
        None => (rest.trim().to_string(), None),
    };

    let (query, memory) = split_memory(&query_text);
    if query.is_empty() {
        return Err(Error::parse_failure("NEXT_QUERY with empty query"));
    }

    Ok(Decision::NextQuery {
        query,
        filters,
        memory,
        raw: raw.to_string(),
    })
}

/// Splits a query at the memory marker. The part after the marker is the
/// memory payload; the query keeps everything before it.
pub fn split_memory(text: &str) -> (String, Option<String>) {
    match text.split_once(MEMORY_MARKER) {
        Some((query, memory)) => {
            let memory = memory.trim();
            (
                query.trim().to_string(),
                (!memory.is_empty()).then(|| memory.to_string()),
            )
        }
        None => (text.trim().to_string(), None),
    }
}

/// Finds the byte range of the first balanced `{...}` object, respecting
/// string literals and escapes. Returns `(start, end_exclusive)`.
fn find_json_object(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset + 1));
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminate_with_conclusion() {
        let decision = parse_decision("TERMINATE: found the answer in ch. 2").unwrap();
        assert_eq!(
            decision,
            Decision::Terminate {
                conclusion: Some("found the answer in ch. 2".to_string())
            }
        );
    }

    #[test]
    fn test_terminate_bare() {
        let decision = parse_decision("some preamble\nTERMINATE").unwrap();
        assert_eq!(decision, Decision::Terminate { conclusion: None });
    }

    #[test]
    fn test_next_query_with_filters() {
        let decision =
            parse_decision(r#"NEXT_QUERY:index compaction strategy {"filename": "lsm.pdf"}"#)
                .unwrap();
        match decision {
            Decision::NextQuery { query, filters, memory, .. } => {
                assert_eq!(query, "index compaction strategy");
                assert_eq!(filters.unwrap()["filename"], json!("lsm.pdf"));
                assert!(memory.is_none());
            }
            _ => panic!("expected NextQuery"),
        }
    }

    #[test]
    fn test_next_query_without_filters() {
        let decision = parse_decision("NEXT_QUERY:write amplification basics").unwrap();
        match decision {
            Decision::NextQuery { query, filters, .. } => {
                assert_eq!(query, "write amplification basics");
                assert!(filters.is_none());
            }
            _ => panic!("expected NextQuery"),
        }
    }

    #[test]
    fn test_next_query_suffix_appended_to_query() {
        let decision =
            parse_decision(r#"NEXT_QUERY:compaction {"filename": "lsm.pdf"} tiered levels"#)
                .unwrap();
        match decision {
            Decision::NextQuery { query, .. } => {
                assert_eq!(query, "compaction tiered levels");
            }
            _ => panic!("expected NextQuery"),
        }
    }

    #[test]
    fn test_next_query_memory_captured_and_stripped() {
        let raw = r#"NEXT_QUERY:bloom filters {"filename": "lsm.pdf"} ##MEMORY## ch.3 covers reads"#;
        let decision = parse_decision(raw).unwrap();
        match decision {
            Decision::NextQuery { query, memory, raw: stored, .. } => {
                assert_eq!(query, "bloom filters");
                assert_eq!(memory.as_deref(), Some("ch.3 covers reads"));
                assert!(stored.contains(MEMORY_MARKER));
            }
            _ => panic!("expected NextQuery"),
        }
    }

    #[test]
    fn test_nested_json_and_braces_in_strings() {
        let decision = parse_decision(
            r#"NEXT_QUERY:q {"meta": {"title": "a {weird} name"}, "filename": "x.pdf"}"#,
        )
        .unwrap();
        match decision {
            Decision::NextQuery { filters, .. } => {
                let filters = filters.unwrap();
                assert_eq!(filters["meta"]["title"], json!("a {weird} name"));
            }
            _ => panic!("expected NextQuery"),
        }
    }

    #[test]
    fn test_malformed_json_is_parse_failure() {
        let result = parse_decision(r#"NEXT_QUERY:q {"filename": lsm.pdf}"#);
        assert!(matches!(result, Err(Error::ParseFailure(_))));
    }

    #[test]
    fn test_missing_directive_is_parse_failure() {
        let result = parse_decision("I think we should search for compaction next.");
        assert!(matches!(result, Err(Error::ParseFailure(_))));
    }

    #[test]
    fn test_directive_found_after_reasoning_lines() {
        let reply = "The results cover reads but not writes.\nNEXT_QUERY:write path internals";
        let decision = parse_decision(reply).unwrap();
        assert!(matches!(decision, Decision::NextQuery { .. }));
    }

    #[test]
    fn test_split_memory_helper() {
        let (query, memory) = split_memory("q ##MEMORY## learned things");
        assert_eq!(query, "q");
        assert_eq!(memory.as_deref(), Some("learned things"));

        let (query, memory) = split_memory("plain query");
        assert_eq!(query, "plain query");
        assert!(memory.is_none());
    }
}
