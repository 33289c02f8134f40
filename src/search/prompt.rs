//! Prompt construction for the decision LLM.
//!
//! Each iteration the engine asks the LLM one question: keep searching or
//! stop. The prompt packs everything the model needs to answer well — the
//! original question, the current result buffer, the attribute names
//! available for filtering, the full iteration history with duplicate
//! warnings, the reconstructed knowledge memory, and the strict output
//! format — so the reply can be parsed mechanically by
//! [`crate::search::decision`].

use crate::search::decision::{MEMORY_MARKER, split_memory};
use crate::search::vector::SearchResult;
use crate::search::SearchIteration;
use std::fmt::Write;

/// How much chunk text to quote per result.
const SNIPPET_LEN: usize = 240;

/// Inputs to [`decision_prompt`].
pub struct DecisionPromptArgs<'a> {
    /// The user's original question.
    pub question: &'a str,
    /// Current result buffer, best first.
    pub buffer: &'a [SearchResult],
    /// Distinct attribute names seen on results, available for filtering.
    pub attribute_names: &'a [String],
    /// Iteration history so far.
    pub iterations: &'a [SearchIteration],
    /// Iteration cap for this run.
    pub max_iterations: usize,
    /// Searches executed so far.
    pub searches_done: usize,
    /// Set when the previous decision repeated an earlier query.
    pub duplicate_warning: bool,
}

/// Builds the decision prompt for the next iteration.
pub fn decision_prompt(args: &DecisionPromptArgs<'_>) -> String {
    let mut p = String::new();

    writeln!(p, "You are steering an iterative vector-database search.").ok();
    writeln!(p).ok();
    writeln!(p, "QUESTION:\n{}", args.question).ok();

    writeln!(p, "\nRESULTS SO FAR ({} unique chunks):", args.buffer.len()).ok();
    if args.buffer.is_empty() {
        writeln!(p, "(none)").ok();
    }
    for (i, result) in args.buffer.iter().enumerate() {
        writeln!(
            p,
            "{}. [{}] score={:.3} {}",
            i + 1,
            result.filename,
            result.score,
            snippet(&result.content),
        )
        .ok();
        if !result.attributes.is_empty() {
            let mut keys: Vec<&str> = result.attributes.keys().map(String::as_str).collect();
            keys.sort_unstable();
            writeln!(p, "   attributes: {}", keys.join(", ")).ok();
        }
    }

    if !args.attribute_names.is_empty() {
        writeln!(
            p,
            "\nATTRIBUTES AVAILABLE FOR FILTERING: {}",
            args.attribute_names.join(", ")
        )
        .ok();
    }

    if !args.iterations.is_empty() {
        writeln!(p, "\nSEARCH HISTORY:").ok();
        for (i, iteration) in args.iterations.iter().enumerate() {
            let (query, _) = split_memory(&iteration.query);
            let filters = iteration
                .filters
                .as_ref()
                .and_then(|f| serde_json::to_string(f).ok())
                .unwrap_or_else(|| "none".to_string());
            writeln!(
                p,
                "{}. query: {} | filters: {} | new results: {}",
                i + 1,
                query,
                filters,
                iteration.results.len()
            )
            .ok();
        }
    }

    if args.duplicate_warning {
        writeln!(
            p,
            "\nWARNING: your previous query repeated an earlier one. Repeating \
             again ends the search. Propose a genuinely different angle."
        )
        .ok();
    }

    let memory = knowledge_acquired(args.iterations);
    if !memory.is_empty() {
        writeln!(p, "\nKNOWLEDGE ACQUIRED SO FAR:\n{memory}").ok();
    }

    writeln!(
        p,
        "\nSEARCH BUDGET: {} of {} searches used.",
        args.searches_done, args.max_iterations
    )
    .ok();

    writeln!(
        p,
        "\nSEARCH GUIDANCE:\n\
         - Vector search matches meaning, not keywords; phrase queries as the \
           passage you expect to find would be written.\n\
         - Narrow with filters when results cluster in the wrong files.\n\
         - Stop as soon as the gathered chunks answer the question."
    )
    .ok();

    writeln!(
        p,
        "\nANSWER WITH EXACTLY ONE LINE, either:\n\
         TERMINATE: <one-sentence conclusion>\n\
         or:\n\
         NEXT_QUERY:<query text> {{<json filters>}} {MEMORY_MARKER} <what you just learned>\n\
         \n\
         FILTER FORMAT REQUIREMENTS:\n\
         - the filter object must be valid JSON with double-quoted keys and \
           string values\n\
         - `chunk_index` may only be used together with `filename`\n\
         - omit the object entirely when no filter helps"
    )
    .ok();

    writeln!(
        p,
        "\nNOVELTY CHECK before you answer: is your query genuinely new, or a \
         rephrasing of one in the history? Would different filters reach \
         different chunks? If neither, TERMINATE."
    )
    .ok();

    p
}

/// Rebuilds the knowledge memory from the iteration history: one bullet per
/// iteration whose stored decision carried a `##MEMORY##` payload.
pub fn knowledge_acquired(iterations: &[SearchIteration]) -> String {
    let mut memory = String::new();
    for (i, iteration) in iterations.iter().enumerate() {
        if let (_, Some(payload)) = split_memory(&iteration.query) {
            writeln!(memory, "- [iteration {}] {}", i + 1, payload).ok();
        }
    }
    memory.trim_end().to_string()
}

fn snippet(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= SNIPPET_LEN {
        collapsed
    } else {
        let mut end = SNIPPET_LEN;
        while !collapsed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &collapsed[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn result(filename: &str, content: &str, score: f64) -> SearchResult {
        SearchResult {
            file_id: filename.trim_end_matches(".pdf").to_string(),
            filename: filename.to_string(),
            score,
            content: content.to_string(),
            attributes: HashMap::new(),
        }
    }

    fn iteration(query: &str, results: usize) -> SearchIteration {
        SearchIteration {
            query: query.to_string(),
            filters: None,
            is_final: false,
            termination_reason: None,
            results: (0..results)
                .map(|i| result("x.pdf", &format!("chunk {i}"), 0.5))
                .collect(),
        }
    }

    fn base_args<'a>(
        buffer: &'a [SearchResult],
        iterations: &'a [SearchIteration],
        attrs: &'a [String],
    ) -> DecisionPromptArgs<'a> {
        DecisionPromptArgs {
            question: "how does compaction work?",
            buffer,
            attribute_names: attrs,
            iterations,
            max_iterations: 5,
            searches_done: 1,
            duplicate_warning: false,
        }
    }

    #[test]
    fn test_prompt_contains_question_and_results() {
        let buffer = vec![result("lsm.pdf", "compaction merges sorted runs", 0.91)];
        let prompt = decision_prompt(&base_args(&buffer, &[], &[]));
        assert!(prompt.contains("how does compaction work?"));
        assert!(prompt.contains("lsm.pdf"));
        assert!(prompt.contains("compaction merges sorted runs"));
        assert!(prompt.contains("NEXT_QUERY:"));
        assert!(prompt.contains("TERMINATE"));
    }

    #[test]
    fn test_prompt_lists_attribute_names() {
        let attrs = vec!["filename".to_string(), "chunk_index".to_string()];
        let prompt = decision_prompt(&base_args(&[], &[], &attrs));
        assert!(prompt.contains("ATTRIBUTES AVAILABLE FOR FILTERING: filename, chunk_index"));
        assert!(prompt.contains("`chunk_index` may only be used together with `filename`"));
    }

    #[test]
    fn test_prompt_history_strips_memory_marker() {
        let iterations = vec![iteration("compaction ##MEMORY## reads covered", 3)];
        let prompt = decision_prompt(&base_args(&[], &iterations, &[]));
        assert!(prompt.contains("1. query: compaction |"));
        assert!(prompt.contains("KNOWLEDGE ACQUIRED SO FAR:"));
        assert!(prompt.contains("- [iteration 1] reads covered"));
    }

    #[test]
    fn test_duplicate_warning_included_when_set() {
        let mut args = base_args(&[], &[], &[]);
        assert!(!decision_prompt(&args).contains("WARNING"));
        args.duplicate_warning = true;
        assert!(decision_prompt(&args).contains("WARNING"));
    }

    #[test]
    fn test_knowledge_acquired_skips_iterations_without_memory() {
        let iterations = vec![
            iteration("plain query", 1),
            iteration("second ##MEMORY## found throughput numbers", 1),
        ];
        let memory = knowledge_acquired(&iterations);
        assert_eq!(memory, "- [iteration 2] found throughput numbers");
    }

    #[test]
    fn test_snippet_truncates_long_content() {
        let long = "word ".repeat(100);
        let s = snippet(&long);
        assert!(s.len() <= SNIPPET_LEN + "…".len());
        assert!(s.ends_with('…'));
    }
}
