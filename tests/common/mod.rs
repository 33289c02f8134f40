//! Scripted seam implementations shared by the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use response_gateway::chat::{
    ChatChoice, ChatChunk, ChatCompletion, ChatMessage, ChatRequest, ChatToolCall, ChatUsage,
    ChunkChoice, ChunkDelta, FinishReason, FunctionDelta, ToolCallDelta,
};
use response_gateway::client::{ChatBackend, ChunkStream};
use response_gateway::search::vector::{
    SearchResult, VectorQuery, VectorSearchPage, VectorStoreClient,
};
use response_gateway::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Installs a fmt subscriber writing to the test-capture buffer, so the
/// gateway's `tracing` output (repetition warnings, store failures, duplicate
/// call ids) shows up in failing tests. Safe to call more than once; only the
/// first call per binary installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// One scripted backend turn.
pub enum Turn {
    /// `complete()` returns this.
    Completion(ChatCompletion),
    /// `stream()` yields these.
    Chunks(Vec<ChatChunk>),
    /// The call fails upstream.
    Fail(u16, &'static str),
    /// The call hangs for this long before yielding chunks.
    DelayedChunks(Duration, Vec<ChatChunk>),
}

/// A backend that replays a fixed script of turns.
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<Turn>>,
    /// Requests seen, for assertions on the adapter output.
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new(turns: Vec<Turn>) -> Self {
        // Every suite builds one of these, so constructing a fixture is the
        // one place that reliably precedes any gateway call.
        init_tracing();
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn next_turn(&self) -> Turn {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("backend script exhausted")
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        self.requests.lock().unwrap().push(request.clone());
        match self.next_turn() {
            Turn::Completion(completion) => Ok(completion),
            Turn::Fail(status, message) => Err(Error::upstream(status, message)),
            _ => panic!("script expected a completion turn"),
        }
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());
        match self.next_turn() {
            Turn::Chunks(chunks) => Ok(chunk_stream(chunks)),
            Turn::DelayedChunks(delay, chunks) => {
                tokio::time::sleep(delay).await;
                Ok(chunk_stream(chunks))
            }
            Turn::Fail(status, message) => Err(Error::upstream(status, message)),
            _ => panic!("script expected a chunk turn"),
        }
    }
}

fn chunk_stream(chunks: Vec<ChatChunk>) -> ChunkStream {
    futures::stream::iter(chunks.into_iter().map(Ok)).boxed()
}

// ============================================================================
// COMPLETION / CHUNK BUILDERS
// ============================================================================

pub fn completion(message: ChatMessage, finish: FinishReason) -> ChatCompletion {
    ChatCompletion {
        id: "cmpl_1".to_string(),
        created: 1_700_000_000,
        model: "m1".to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message,
            finish_reason: Some(finish),
        }],
        usage: Some(ChatUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
    }
}

pub fn text_completion(text: &str) -> ChatCompletion {
    completion(ChatMessage::text("assistant", text), FinishReason::Stop)
}

pub fn tool_call_completion(calls: Vec<(&str, &str, &str)>) -> ChatCompletion {
    let message = ChatMessage {
        role: "assistant".to_string(),
        content: None,
        tool_calls: Some(
            calls
                .into_iter()
                .map(|(id, name, args)| ChatToolCall::function(id, name, args))
                .collect(),
        ),
        tool_call_id: None,
        annotations: None,
    };
    completion(message, FinishReason::ToolCalls)
}

pub fn text_delta_chunk(content: &str) -> ChatChunk {
    ChatChunk {
        id: "cmpl_1".to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: None,
                content: Some(content.to_string()),
                tool_calls: None,
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

pub fn finish_chunk(finish: FinishReason) -> ChatChunk {
    ChatChunk {
        id: "cmpl_1".to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some(finish),
        }],
        usage: None,
    }
}

pub fn tool_delta_chunk(
    index: u32,
    id: Option<&str>,
    name: Option<&str>,
    arguments: Option<&str>,
) -> ChatChunk {
    ChatChunk {
        id: "cmpl_1".to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: None,
                content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: id.map(str::to_string),
                    function: Some(FunctionDelta {
                        name: name.map(str::to_string),
                        arguments: arguments.map(str::to_string),
                    }),
                }]),
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

/// Streamed text turn: one delta per fragment, then a `stop` finish chunk.
pub fn text_stream_turn(fragments: &[&str]) -> Turn {
    let mut chunks: Vec<ChatChunk> = fragments.iter().map(|f| text_delta_chunk(f)).collect();
    chunks.push(finish_chunk(FinishReason::Stop));
    Turn::Chunks(chunks)
}

// ============================================================================
// VECTOR STORE
// ============================================================================

/// A vector store that replays a queue of pages per store id; an exhausted
/// queue returns empty pages.
pub struct ScriptedVectorStore {
    pages: Mutex<HashMap<String, VecDeque<Result<VectorSearchPage>>>>,
    /// (store id, query text, serialized filter) per search, for assertions.
    pub queries: Mutex<Vec<(String, String, Option<serde_json::Value>)>>,
}

impl ScriptedVectorStore {
    pub fn new() -> Self {
        init_tracing();
        Self {
            pages: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn push_page(&self, store_id: &str, data: Vec<SearchResult>) {
        self.pages
            .lock()
            .unwrap()
            .entry(store_id.to_string())
            .or_default()
            .push_back(Ok(VectorSearchPage { data }));
    }

    pub fn push_failure(&self, store_id: &str) {
        self.pages
            .lock()
            .unwrap()
            .entry(store_id.to_string())
            .or_default()
            .push_back(Err(Error::stream("store unavailable")));
    }
}

#[async_trait]
impl VectorStoreClient for ScriptedVectorStore {
    async fn search(&self, store_id: &str, query: &VectorQuery) -> Result<VectorSearchPage> {
        self.queries.lock().unwrap().push((
            store_id.to_string(),
            query.query.clone(),
            query
                .filters
                .as_ref()
                .and_then(|f| serde_json::to_value(f).ok()),
        ));
        self.pages
            .lock()
            .unwrap()
            .get_mut(store_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(VectorSearchPage::default()))
    }
}

/// A retrieved chunk with a `chunk_id` attribute.
pub fn chunk(file_id: &str, chunk_id: &str, content: &str, score: f64) -> SearchResult {
    let mut attributes = HashMap::new();
    attributes.insert("chunk_id".to_string(), serde_json::json!(chunk_id));
    attributes.insert(
        "filename".to_string(),
        serde_json::json!(format!("{file_id}.pdf")),
    );
    SearchResult {
        file_id: file_id.to_string(),
        filename: format!("{file_id}.pdf"),
        score,
        content: content.to_string(),
        attributes,
    }
}
