//! Agentic search: iterative LLM-guided vector retrieval.
//!
//! The engine answers an open question by looping up to `max_iterations`
//! rounds of vector search. Each round an LLM reads the gathered results and
//! either terminates or proposes the next query with a structured filter and
//! a `##MEMORY##` note of what it learned. The engine keeps a score-ranked
//! buffer of unique chunks, excludes already-seen chunk ids from subsequent
//! searches, tunes the decision LLM's sampling from result relevance, and
//! terminates on sufficiency, repetition, parse failure, or iteration
//! exhaustion.
//!
//! Submodules mirror the engine's collaborators: [`seed`] fetches the initial
//! candidates, [`prompt`] builds the decision prompt, [`decision`] parses the
//! reply, [`filter`] composes the store filter, and [`tuner`] adjusts
//! sampling.

pub mod decision;
pub mod filter;
pub mod prompt;
pub mod seed;
pub mod tuner;
pub mod vector;

use crate::chat::{ChatMessage, ChatRequest};
use crate::client::ChatBackend;
use crate::config::{GatewayConfig, TuningFlags};
use crate::events::{EventEmitter, ResponseEvent, SearchCitation};
use crate::types::AgenticSearchTool;
use crate::{Error, Result};
use decision::{Decision, parse_decision, split_memory};
use filter::{Filter, chunk_index_without_filename, compose, compose_base};
use prompt::{DecisionPromptArgs, decision_prompt};
use seed::SeedStrategy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use tuner::{HyperParams, HyperTuner, average_relevance};
use vector::{SearchResult, VectorQuery, VectorStoreClient, dedup_and_rank};

/// Cap on the pre-seed fetch regardless of the multiplier.
const SEED_CAP: usize = 100;

/// Decision-parse retry budget per round.
const DECISION_RETRIES: usize = 3;

/// One invocation of the engine.
#[derive(Debug, Clone)]
pub struct AgenticSearchParams {
    /// The question to answer.
    pub query: String,
    /// Stores to search (at least one).
    pub vector_store_ids: Vec<String>,
    /// Caller's base filter, ANDed into every search.
    pub filters: Option<Filter>,
    /// Cap on retained results.
    pub max_results: usize,
    /// Cap on LLM-guided iterations.
    pub max_iterations: usize,
    /// Seed strategy name.
    pub seed_strategy: Option<String>,
    /// Hybrid mixing parameter override.
    pub alpha: Option<f64>,
    /// Tuner toggles.
    pub tuning: TuningFlags,
    /// Model used for decision calls.
    pub model: String,
}

impl AgenticSearchParams {
    /// Builds invocation parameters from a request's tool definition,
    /// falling back to process defaults for anything unset.
    pub fn from_tool(
        tool: &AgenticSearchTool,
        query: impl Into<String>,
        model: impl Into<String>,
        config: &GatewayConfig,
    ) -> Self {
        let defaults = config.tuning();
        Self {
            query: query.into(),
            vector_store_ids: tool.vector_store_ids.clone(),
            filters: tool.filters.clone(),
            max_results: tool.max_results.unwrap_or(10),
            max_iterations: tool.max_iterations.unwrap_or(5),
            seed_strategy: tool.seed_strategy.clone(),
            alpha: tool.alpha,
            tuning: TuningFlags {
                temperature: tool.enable_temperature_tuning.unwrap_or(defaults.temperature),
                top_p: tool.enable_top_p_tuning.unwrap_or(defaults.top_p),
                presence_penalty: tool
                    .enable_presence_penalty_tuning
                    .unwrap_or(defaults.presence_penalty),
                frequency_penalty: tool
                    .enable_frequency_penalty_tuning
                    .unwrap_or(defaults.frequency_penalty),
            },
            model: model.into(),
        }
    }
}

/// One round of the search.
///
/// `query` stores the raw decision line — including any `##MEMORY##` marker —
/// so the knowledge memory can be reconstructed from history. `results` is
/// in-process state only and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIteration {
    /// The raw decision string for this round (or the termination record).
    pub query: String,
    /// The filter applied (user base ANDed with the LLM's proposal;
    /// exclusion clauses are not recorded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filter>,
    /// Whether this is the terminal record of the run.
    pub is_final: bool,
    /// Why the run ended (final record only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    /// New results fetched this round. In-process only.
    #[serde(skip, default)]
    pub results: Vec<SearchResult>,
}

impl SearchIteration {
    fn executed(query: String, filters: Option<Filter>, results: Vec<SearchResult>) -> Self {
        Self {
            query,
            filters,
            is_final: false,
            termination_reason: None,
            results,
        }
    }

    fn terminal(query: String, reason: impl Into<String>) -> Self {
        Self {
            query,
            filters: None,
            is_final: true,
            termination_reason: Some(reason.into()),
            results: Vec::new(),
        }
    }
}

/// The assembled answer of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgenticSearchResponse {
    /// Unique chunks, best first (the citations).
    pub data: Vec<SearchResult>,
    /// Ordered iteration history (without per-iteration result payloads).
    pub iterations: Vec<SearchIteration>,
    /// Rendered knowledge memory.
    pub knowledge_acquired: String,
}

/// The agentic search engine (C2).
pub struct AgenticSearchEngine {
    llm: Arc<dyn ChatBackend>,
    vector: Arc<dyn VectorStoreClient>,
    config: GatewayConfig,
}

/// Per-run mutable state owned by the engine's single task.
struct RunState {
    buffer: Vec<SearchResult>,
    seen_keys: HashSet<(String, String)>,
    seen_chunk_ids: Vec<String>,
    iterations: Vec<SearchIteration>,
    best_score: f64,
    hyper: HyperParams,
}

impl RunState {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            seen_keys: HashSet::new(),
            seen_chunk_ids: Vec::new(),
            iterations: Vec::new(),
            best_score: 0.0,
            hyper: HyperParams::default(),
        }
    }

    /// Folds new results into the buffer (unique by dedup key) and the
    /// exclusion accounting (every chunk id, unique or not).
    fn absorb(&mut self, results: &[SearchResult], max_results: usize) {
        for result in results {
            if let Some(chunk_id) = result.chunk_id() {
                if !self.seen_chunk_ids.iter().any(|id| id == chunk_id) {
                    self.seen_chunk_ids.push(chunk_id.to_string());
                }
            }
            if result.score > self.best_score {
                self.best_score = result.score;
            }
            let key = result.dedup_key();
            if self.seen_keys.insert(key) {
                self.buffer.push(result.clone());
            }
        }
        self.buffer = dedup_and_rank(std::mem::take(&mut self.buffer));
        self.buffer.truncate(max_results);
    }

    fn citations(&self) -> Vec<SearchCitation> {
        self.buffer
            .iter()
            .map(|r| SearchCitation {
                file_id: r.file_id.clone(),
                filename: r.filename.clone(),
                score: r.score,
            })
            .collect()
    }

    fn attribute_names(results: &[SearchResult]) -> Vec<String> {
        let mut names: Vec<String> = results
            .iter()
            .flat_map(|r| r.attributes.keys().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort_unstable();
        names
    }
}

impl AgenticSearchEngine {
    /// Creates an engine over the given LLM and vector-store clients.
    pub fn new(
        llm: Arc<dyn ChatBackend>,
        vector: Arc<dyn VectorStoreClient>,
        config: GatewayConfig,
    ) -> Self {
        Self { llm, vector, config }
    }

    /// Runs one search. Progress events flow through `emitter` when the run
    /// is hosted inside a streaming response.
    pub async fn run(
        &self,
        params: &AgenticSearchParams,
        emitter: Option<&EventEmitter>,
    ) -> Result<AgenticSearchResponse> {
        if params.query.trim().is_empty() {
            return Err(Error::invalid_input("agentic search query must not be blank"));
        }
        if params.vector_store_ids.is_empty() {
            return Err(Error::invalid_input(
                "agentic search requires at least one vector store id",
            ));
        }
        if params.max_results == 0 {
            return Err(Error::invalid_input("max_results must be greater than zero"));
        }
        if params.max_iterations == 0 {
            return Err(Error::invalid_input(
                "max_iterations must be greater than zero",
            ));
        }

        let mut state = RunState::new();
        let tuner = HyperTuner::new(params.tuning);

        // Pre-seed.
        let strategy = SeedStrategy::from_name(
            params.seed_strategy.as_deref(),
            params.alpha.unwrap_or(self.config.alpha_default()),
        );
        let seed_k =
            (params.max_results * self.config.initial_seed_multiplier()).min(SEED_CAP);
        let seeded = strategy
            .seed(
                self.vector.as_ref(),
                &params.vector_store_ids,
                &params.query,
                seed_k,
                params.filters.as_ref(),
            )
            .await?;

        if seeded.is_empty() {
            state.iterations.push(SearchIteration::terminal(
                params.query.clone(),
                "no initial results",
            ));
            return Ok(self.assemble(state));
        }

        state.absorb(&seeded, params.max_results);
        let relevance = average_relevance(&state.buffer, state.best_score);
        tuner.retune(&mut state.hyper, relevance);

        // Initial decision over the pre-seed.
        let mut pending = match self.next_decision(params, &state, &seeded, false).await {
            Ok(Decision::Terminate { conclusion }) => {
                state.iterations.push(SearchIteration::terminal(
                    conclusion.clone().unwrap_or_else(|| "TERMINATE".to_string()),
                    conclusion.unwrap_or_else(|| "terminated by llm".to_string()),
                ));
                return Ok(self.assemble(state));
            }
            Ok(next @ Decision::NextQuery { .. }) => next,
            Err(e) => {
                state
                    .iterations
                    .push(SearchIteration::terminal(params.query.clone(), failure_reason(&e)));
                return Ok(self.assemble(state));
            }
        };

        let mut executed: Vec<(String, String)> = Vec::new();
        let mut repeats = 0usize;
        let mut finalized = false;

        for i in 1..=params.max_iterations {
            let Decision::NextQuery {
                query,
                filters,
                memory,
                raw,
            } = pending.clone()
            else {
                unreachable!("pending decision is always NextQuery here");
            };

            if let Some(emitter) = emitter {
                emitter
                    .emit(ResponseEvent::AgenticSearchIteration {
                        iteration: i,
                        remaining_iterations: params.max_iterations - i,
                        query: query.clone(),
                        reasoning: memory.clone(),
                        citations: state.citations(),
                    })
                    .await?;
            }

            // Repetition guard: warn on the first exact repeat, stop on the
            // second.
            let signature = (
                query.clone(),
                serde_json::to_string(&filters).unwrap_or_default(),
            );
            let repeated = executed.contains(&signature);
            if repeated {
                repeats += 1;
                warn!(iteration = i, query = %query, repeats, "repeated agentic search query");
                if repeats >= 2 {
                    state
                        .iterations
                        .push(SearchIteration::terminal(raw, "repeated queries"));
                    finalized = true;
                    break;
                }
            }
            executed.push(signature);

            // Search with user AND llm filters, plus chunk exclusions.
            let base_filter = compose_base(params.filters.as_ref(), filters.as_ref());
            let full_filter = compose(
                params.filters.as_ref(),
                filters.as_ref(),
                &state.seen_chunk_ids,
            );
            let new_results = self
                .search_all_stores(&params.vector_store_ids, &query, params.max_results, full_filter)
                .await;
            debug!(
                iteration = i,
                fetched = new_results.len(),
                "agentic search round complete"
            );

            state.iterations.push(SearchIteration::executed(
                raw.clone(),
                base_filter,
                new_results.clone(),
            ));
            state.absorb(&new_results, params.max_results);

            let relevance = average_relevance(&dedup_and_rank(new_results.clone()), state.best_score);
            tuner.retune(&mut state.hyper, relevance);

            match self
                .next_decision(params, &state, &new_results, repeated)
                .await
            {
                Ok(Decision::Terminate { conclusion }) => {
                    state.iterations.push(SearchIteration::terminal(
                        conclusion.clone().unwrap_or_else(|| "TERMINATE".to_string()),
                        conclusion.unwrap_or_else(|| "terminated by llm".to_string()),
                    ));
                    finalized = true;
                    break;
                }
                Ok(next @ Decision::NextQuery { .. }) => {
                    pending = next;
                }
                Err(e) => {
                    state
                        .iterations
                        .push(SearchIteration::terminal(query, failure_reason(&e)));
                    finalized = true;
                    break;
                }
            }
        }

        if !finalized {
            state.iterations.push(SearchIteration::terminal(
                params.query.clone(),
                "max iterations reached",
            ));
        }

        Ok(self.assemble(state))
    }

    /// Queries every store, keeping partial results when a store fails.
    async fn search_all_stores(
        &self,
        store_ids: &[String],
        query: &str,
        max_results: usize,
        filters: Option<Filter>,
    ) -> Vec<SearchResult> {
        let vector_query = VectorQuery {
            query: query.to_string(),
            max_num_results: max_results,
            filters,
        };
        let mut collected = Vec::new();
        for store_id in store_ids {
            match self.vector.search(store_id, &vector_query).await {
                Ok(page) => collected.extend(page.data),
                Err(e) => {
                    warn!(store_id = %store_id, error = %e, "vector store query failed");
                }
            }
        }
        collected
    }

    /// Asks the decision LLM for the next move, retrying up to
    /// [`DECISION_RETRIES`] times on unparseable replies or filters that use
    /// `chunk_index` without `filename`.
    ///
    /// # Errors
    ///
    /// An LLM transport failure propagates as-is (the caller finalizes with
    /// "llm error"); exhausted retries yield a parse failure.
    async fn next_decision(
        &self,
        params: &AgenticSearchParams,
        state: &RunState,
        latest: &[SearchResult],
        duplicate_warning: bool,
    ) -> Result<Decision> {
        let attribute_names = RunState::attribute_names(latest);
        let prompt = decision_prompt(&DecisionPromptArgs {
            question: &params.query,
            buffer: &state.buffer,
            attribute_names: &attribute_names,
            iterations: &state.iterations,
            max_iterations: params.max_iterations,
            searches_done: state.iterations.iter().filter(|it| !it.is_final).count(),
            duplicate_warning,
        });

        let mut request = ChatRequest::new(
            params.model.clone(),
            vec![ChatMessage::text("user", prompt)],
        );
        request.temperature = Some(state.hyper.temperature);
        request.top_p = Some(state.hyper.top_p);
        request.presence_penalty = Some(state.hyper.presence_penalty);
        request.frequency_penalty = Some(state.hyper.frequency_penalty);

        let mut last_failure = None;
        for attempt in 0..DECISION_RETRIES {
            let completion = self.llm.complete(&request).await?;
            let reply = completion
                .choices
                .first()
                .map(|c| c.message.content_text())
                .unwrap_or_default();

            match parse_decision(&reply) {
                Ok(Decision::NextQuery { ref filters, .. })
                    if filters
                        .as_ref()
                        .is_some_and(chunk_index_without_filename) =>
                {
                    warn!(attempt, "decision used chunk_index without filename, retrying");
                    last_failure = Some(Error::parse_failure(
                        "chunk_index filter without filename",
                    ));
                }
                Ok(decision) => return Ok(decision),
                Err(e) => {
                    warn!(attempt, error = %e, "unparseable decision, retrying");
                    last_failure = Some(e);
                }
            }
        }

        Err(last_failure
            .unwrap_or_else(|| Error::parse_failure("decision retries exhausted")))
    }

    fn assemble(&self, state: RunState) -> AgenticSearchResponse {
        let data = dedup_and_rank(state.buffer);
        let knowledge_acquired = prompt::knowledge_acquired(&state.iterations);
        AgenticSearchResponse {
            data,
            iterations: state.iterations,
            knowledge_acquired,
        }
    }
}

/// Maps a decision failure onto the run's termination reason.
fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::ParseFailure(_) => "parse failure",
        _ => "llm error",
    }
}

/// Extracts the memory payload from a stored iteration query, for callers
/// rendering per-iteration reasoning.
pub fn iteration_memory(iteration: &SearchIteration) -> Option<String> {
    split_memory(&iteration.query).1
}

/// Parses the `{"query": ...}` argument object of the agentic-search tool.
pub fn parse_tool_arguments(arguments: &str) -> Result<String> {
    let value: Map<String, Value> = serde_json::from_str(arguments)
        .map_err(|e| Error::bad_arguments(format!("agentic_search arguments: {e}")))?;
    value
        .get("query")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| Error::bad_arguments("agentic_search requires a non-empty `query`"))
}
