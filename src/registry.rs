//! Tool registry: typed descriptors and executors keyed by tool name.
//!
//! The registry replaces reflective find-and-cast dispatch with an explicit
//! map: each entry pairs a [`ToolDescriptor`] with its [`ToolExecutor`].
//! Aliases are a one-hop mapping resolved at dispatcher entry; no alias
//! graph is ever built. The registry is assembled at process start and
//! read-only afterwards, so concurrent responses share it behind an `Arc`
//! without locking.
//!
//! Three built-in executors ship with the core: `think` (acknowledge and
//! log), `file_search` (single-shot ranked vector query), and
//! `agentic_search` (the iterative engine in [`crate::search`]).

use crate::client::ChatBackend;
use crate::config::GatewayConfig;
use crate::events::EventEmitter;
use crate::search::vector::{VectorQuery, VectorStoreClient, dedup_and_rank};
use crate::search::{AgenticSearchEngine, AgenticSearchParams};
use crate::types::ResponseRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// How a tool is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolProtocol {
    /// Executed in-process by this gateway.
    Native,
    /// Invoked through a remote tool server.
    Remote,
}

/// Where a tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolHosting {
    /// This process.
    Local,
    /// A remote executor.
    Remote,
}

/// Metadata for a registered tool. Loaded at process start; read-only at
/// runtime.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Canonical tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: Value,
    /// Invocation protocol.
    pub protocol: ToolProtocol,
    /// Execution locality.
    pub hosting: ToolHosting,
    /// Whether multiple calls in one batch may run concurrently.
    pub parallel_safe: bool,
}

/// Everything an executor needs for one invocation.
pub struct ToolInvocation<'a> {
    /// Canonical tool name (aliases already resolved).
    pub name: &'a str,
    /// Raw JSON argument string from the model.
    pub arguments: &'a str,
    /// The call id, for correlation.
    pub call_id: &'a str,
    /// The originating request (tool definitions live here).
    pub request: &'a ResponseRequest,
    /// Event emitter for tools that stream progress; absent on the
    /// non-streaming path.
    pub emitter: Option<&'a EventEmitter>,
}

/// Executes one tool invocation.
///
/// Returning `Ok(None)` means "no output to append": the function-call item
/// still lands in the working sequence, the model simply sees no output for
/// it.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Runs the tool. The output string is typically JSON.
    async fn execute(&self, invocation: ToolInvocation<'_>) -> Result<Option<String>>;
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    executor: Arc<dyn ToolExecutor>,
}

/// Name-keyed registry of descriptors and executors.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    aliases: HashMap<String, String>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the three built-in tools wired to the given
    /// clients.
    pub fn with_builtins(
        llm: Arc<dyn ChatBackend>,
        vector: Arc<dyn VectorStoreClient>,
        config: GatewayConfig,
    ) -> Self {
        let mut registry = Self::new();

        registry.register(
            ToolDescriptor {
                name: "think".to_string(),
                description: "Record a thought before acting. The thought is logged, not executed."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "thought": {"type": "string"}
                    },
                    "required": ["thought"]
                }),
                protocol: ToolProtocol::Native,
                hosting: ToolHosting::Local,
                parallel_safe: true,
            },
            Arc::new(ThinkExecutor),
        );

        registry.register(
            ToolDescriptor {
                name: "file_search".to_string(),
                description: "Search the configured vector stores for relevant passages."
                    .to_string(),
                parameters: query_schema(),
                protocol: ToolProtocol::Native,
                hosting: ToolHosting::Local,
                parallel_safe: true,
            },
            Arc::new(FileSearchExecutor {
                vector: vector.clone(),
            }),
        );

        registry.register(
            ToolDescriptor {
                name: "agentic_search".to_string(),
                description:
                    "Iteratively search the configured vector stores to answer a question."
                        .to_string(),
                parameters: query_schema(),
                protocol: ToolProtocol::Native,
                hosting: ToolHosting::Local,
                // The engine owns mutable per-run state and streams progress
                // events; one run at a time per response.
                parallel_safe: false,
            },
            Arc::new(AgenticSearchExecutor {
                engine: AgenticSearchEngine::new(llm, vector, config.clone()),
                config,
            }),
        );

        registry
    }

    /// Registers a tool under its canonical name.
    pub fn register(&mut self, descriptor: ToolDescriptor, executor: Arc<dyn ToolExecutor>) {
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                executor,
            },
        );
    }

    /// Registers a one-hop alias for a canonical name.
    pub fn register_alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.aliases.insert(alias.into(), canonical.into());
    }

    /// Resolves an alias to its canonical name; unknown names pass through.
    pub fn resolve_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Looks up a descriptor by (alias-resolved) name.
    pub fn find(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools
            .get(self.resolve_name(name))
            .map(|t| &t.descriptor)
    }

    /// Looks up an executor by (alias-resolved) name.
    pub fn executor(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.tools
            .get(self.resolve_name(name))
            .map(|t| t.executor.clone())
    }

    /// Every name — canonical or alias — the gateway resolves internally.
    /// The streaming multiplexer suppresses argument deltas for these.
    pub fn internal_names(&self) -> HashSet<String> {
        self.tools
            .keys()
            .cloned()
            .chain(self.aliases.keys().cloned())
            .collect()
    }

    /// The alias map relevant to a request (currently the full map; kept as
    /// a per-request hook so hosts can scope aliases later).
    pub fn build_alias_map(&self, _request: &ResponseRequest) -> HashMap<String, String> {
        self.aliases.clone()
    }
}

fn query_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "What to search for"}
        },
        "required": ["query"]
    })
}

fn parse_query_argument(arguments: &str, tool: &str) -> Result<String> {
    let value: Value = serde_json::from_str(arguments)
        .map_err(|e| Error::bad_arguments(format!("{tool} arguments: {e}")))?;
    value
        .get("query")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| Error::bad_arguments(format!("{tool} requires a non-empty `query`")))
}

// ============================================================================
// BUILT-IN EXECUTORS
// ============================================================================

/// `think`: acknowledge the thought; the log entry is the side effect.
struct ThinkExecutor;

#[async_trait]
impl ToolExecutor for ThinkExecutor {
    async fn execute(&self, invocation: ToolInvocation<'_>) -> Result<Option<String>> {
        let thought = serde_json::from_str::<Value>(invocation.arguments)
            .ok()
            .and_then(|v| v.get("thought").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        info!(call_id = %invocation.call_id, thought = %thought, "think");
        Ok(Some("Your thought has been noted.".to_string()))
    }
}

/// `file_search`: one ranked, deduplicated query across the request's
/// configured stores.
struct FileSearchExecutor {
    vector: Arc<dyn VectorStoreClient>,
}

#[async_trait]
impl ToolExecutor for FileSearchExecutor {
    async fn execute(&self, invocation: ToolInvocation<'_>) -> Result<Option<String>> {
        let query = parse_query_argument(invocation.arguments, "file_search")?;
        let tool = invocation.request.file_search_tool().ok_or_else(|| {
            Error::tool_execution("file_search invoked without a file_search tool definition")
        })?;
        let max_results = tool.max_num_results.unwrap_or(10);

        let vector_query = VectorQuery {
            query,
            max_num_results: max_results,
            filters: tool.filters.clone(),
        };

        let mut collected = Vec::new();
        for store_id in &tool.vector_store_ids {
            match self.vector.search(store_id, &vector_query).await {
                Ok(page) => collected.extend(page.data),
                Err(e) => {
                    tracing::warn!(store_id = %store_id, error = %e, "file_search store failed");
                }
            }
        }

        let mut ranked = dedup_and_rank(collected);
        ranked.truncate(max_results);
        Ok(Some(serde_json::to_string(&json!({ "data": ranked }))?))
    }
}

/// `agentic_search`: delegates to the iterative engine.
struct AgenticSearchExecutor {
    engine: AgenticSearchEngine,
    config: GatewayConfig,
}

#[async_trait]
impl ToolExecutor for AgenticSearchExecutor {
    async fn execute(&self, invocation: ToolInvocation<'_>) -> Result<Option<String>> {
        let query = crate::search::parse_tool_arguments(invocation.arguments)?;
        let tool = invocation.request.agentic_search_tool().ok_or_else(|| {
            Error::tool_execution(
                "agentic_search invoked without an agentic_search tool definition",
            )
        })?;
        let params = AgenticSearchParams::from_tool(
            tool,
            query,
            invocation.request.model.clone(),
            &self.config,
        );
        let response = self.engine.run(&params, invocation.emitter).await?;
        Ok(Some(serde_json::to_string(&response)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatCompletion, ChatRequest};
    use crate::client::ChunkStream;
    use crate::search::vector::VectorSearchPage;

    struct DeadBackend;

    #[async_trait]
    impl ChatBackend for DeadBackend {
        async fn complete(&self, _request: &ChatRequest) -> Result<ChatCompletion> {
            Err(Error::upstream(500, "unused"))
        }
        async fn stream(&self, _request: &ChatRequest) -> Result<ChunkStream> {
            Err(Error::upstream(500, "unused"))
        }
    }

    struct EmptyStore;

    #[async_trait]
    impl VectorStoreClient for EmptyStore {
        async fn search(&self, _store_id: &str, _query: &VectorQuery) -> Result<VectorSearchPage> {
            Ok(VectorSearchPage::default())
        }
    }

    fn builtin_registry() -> ToolRegistry {
        ToolRegistry::with_builtins(
            Arc::new(DeadBackend),
            Arc::new(EmptyStore),
            GatewayConfig::default(),
        )
    }

    #[test]
    fn test_builtins_registered() {
        let registry = builtin_registry();
        assert!(registry.find("think").is_some());
        assert!(registry.find("file_search").is_some());
        assert!(registry.find("agentic_search").is_some());
        assert!(registry.find("no_such_tool").is_none());
    }

    #[test]
    fn test_alias_resolution_is_one_hop() {
        let mut registry = builtin_registry();
        registry.register_alias("search_files", "file_search");
        assert_eq!(registry.resolve_name("search_files"), "file_search");
        assert!(registry.find("search_files").is_some());
        // A chain is not followed; the second hop stays unresolved.
        registry.register_alias("fs", "search_files");
        assert!(registry.find("fs").is_none());
    }

    #[test]
    fn test_internal_names_include_aliases() {
        let mut registry = builtin_registry();
        registry.register_alias("search_files", "file_search");
        let names = registry.internal_names();
        assert!(names.contains("think"));
        assert!(names.contains("file_search"));
        assert!(names.contains("search_files"));
    }

    #[test]
    fn test_descriptor_flags() {
        let registry = builtin_registry();
        let think = registry.find("think").unwrap();
        assert_eq!(think.protocol, ToolProtocol::Native);
        assert!(think.parallel_safe);
        let agentic = registry.find("agentic_search").unwrap();
        assert!(!agentic.parallel_safe);
    }

    #[tokio::test]
    async fn test_think_executor_acknowledges() {
        let registry = builtin_registry();
        let request = ResponseRequest::from_text("m1", "q");
        let executor = registry.executor("think").unwrap();
        let output = executor
            .execute(ToolInvocation {
                name: "think",
                arguments: r#"{"thought": "check the units"}"#,
                call_id: "c1",
                request: &request,
                emitter: None,
            })
            .await
            .unwrap();
        assert_eq!(output.as_deref(), Some("Your thought has been noted."));
    }

    #[tokio::test]
    async fn test_file_search_requires_tool_definition() {
        let registry = builtin_registry();
        let request = ResponseRequest::from_text("m1", "q");
        let executor = registry.executor("file_search").unwrap();
        let result = executor
            .execute(ToolInvocation {
                name: "file_search",
                arguments: r#"{"query": "compaction"}"#,
                call_id: "c1",
                request: &request,
                emitter: None,
            })
            .await;
        assert!(matches!(result, Err(Error::ToolExecution(_))));
    }

    #[tokio::test]
    async fn test_file_search_rejects_bad_arguments() {
        let registry = builtin_registry();
        let request = ResponseRequest::from_text("m1", "q");
        let executor = registry.executor("file_search").unwrap();
        let result = executor
            .execute(ToolInvocation {
                name: "file_search",
                arguments: "not json",
                call_id: "c1",
                request: &request,
                emitter: None,
            })
            .await;
        assert!(matches!(result, Err(Error::BadArguments(_))));
    }
}
