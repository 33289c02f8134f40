//! Core type definitions for the extended-response API surface.
//!
//! This module contains the data structures exchanged with callers of the
//! gateway. The type system is organized into three main categories:
//!
//! # Request Side
//!
//! - [`ResponseRequest`]: the incoming call — input, model, sampling, tools,
//!   streaming/storage flags
//! - [`ResponseInput`]: free text or an ordered sequence of [`InputItem`]s
//! - [`InputItem`]: one unit in the conversation sequence (message,
//!   function call, function-call output, reasoning)
//! - [`ToolDefinition`]: the tagged tool sum type (function, file search,
//!   web search, agentic search)
//!
//! # Response Side
//!
//! - [`Response`]: the final record — id, status, ordered [`OutputItem`]s,
//!   usage, error
//! - [`OutputItem`]: message / function call / reasoning output
//!
//! # Design Notes
//!
//! Wire enums are tagged with a `"type"` field (`#[serde(tag = "type")]`) so
//! they round-trip through JSON exactly as the API documents them; content
//! unions that accept either a bare string or a structured array use
//! `#[serde(untagged)]`. Input items accumulate across tool iterations and
//! are appended, never mutated.

use crate::search::filter::Filter;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Generates a prefixed identifier like `resp_f3k9...` using 24 random
/// alphanumeric characters.
pub(crate) fn generate_id(prefix: &str) -> String {
    use rand::Rng;
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("{prefix}_{suffix}")
}

/// Epoch seconds for `created_at` stamps.
pub(crate) fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ============================================================================
// INPUT SIDE
// ============================================================================

/// The `input` field of a request: either free text (wrapped into a single
/// user message during normalization) or an ordered item sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseInput {
    /// Free text, treated as a single user message.
    Text(String),
    /// An explicit ordered conversation sequence.
    Items(Vec<InputItem>),
}

/// Role of a conversation message item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    /// Input from the human or calling application.
    User,
    /// A prior model response.
    Assistant,
    /// Context-establishing instructions.
    System,
    /// Instructions from the integrating developer, ranked between system
    /// and user.
    Developer,
}

impl ItemRole {
    /// The chat-completion role string this role maps onto.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemRole::User => "user",
            ItemRole::Assistant => "assistant",
            ItemRole::System => "system",
            ItemRole::Developer => "developer",
        }
    }
}

/// Image detail level for multipart image inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    /// Low resolution, fixed token cost.
    Low,
    /// Full resolution.
    High,
    /// Backend decides (default).
    #[default]
    Auto,
}

impl std::fmt::Display for ImageDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageDetail::Low => write!(f, "low"),
            ImageDetail::High => write!(f, "high"),
            ImageDetail::Auto => write!(f, "auto"),
        }
    }
}

/// One part of a multipart user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    InputText {
        /// The text content.
        text: String,
    },
    /// An image by URL (or data URI).
    InputImage {
        /// Image URL or data URI.
        image_url: String,
        /// Requested detail level.
        #[serde(default)]
        detail: ImageDetail,
    },
    /// A file reference, by id or inline data.
    InputFile {
        /// Identifier of an already-uploaded file.
        #[serde(skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        /// Inline base64 file data.
        #[serde(skip_serializing_if = "Option::is_none")]
        file_data: Option<String>,
        /// Original filename, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

/// Content of a message item: a bare string or structured parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Text(String),
    /// Multipart content (text, images, file references).
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flattens the content to plain text, joining text parts with newlines.
    /// Non-text parts contribute nothing.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::InputText { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A conversation message input item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageItem {
    /// Who the message is from.
    pub role: ItemRole,
    /// Text or multipart content.
    pub content: MessageContent,
}

/// A model-requested function invocation.
///
/// `call_id` is unique within a response and correlates the call with its
/// output item. `arguments` is the raw JSON string exactly as the model
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallItem {
    /// Item identifier (`fc_...`), assigned by the gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Call identifier, unique within the response.
    pub call_id: String,
    /// Name of the tool being invoked.
    pub name: String,
    /// Raw JSON argument string.
    pub arguments: String,
}

impl FunctionCallItem {
    /// Creates a function-call item with a fresh `fc_` item id.
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(generate_id("fc")),
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// The textual result of an executed function call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallOutputItem {
    /// Call identifier matching the originating [`FunctionCallItem`].
    pub call_id: String,
    /// Tool output, typically JSON.
    pub output: String,
}

/// A reasoning item (model thinking extracted from `<think>` prefixes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningItem {
    /// Item identifier (`rs_...`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The reasoning text.
    pub text: String,
}

/// A unit in the ordered conversation sequence.
///
/// Items accumulate across tool iterations: the orchestrator appends
/// function-call and function-call-output pairs between backend turns and
/// never rewrites earlier items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    /// A conversation message.
    Message(MessageItem),
    /// A tool invocation requested by the model.
    FunctionCall(FunctionCallItem),
    /// The output of an executed tool invocation.
    FunctionCallOutput(FunctionCallOutputItem),
    /// Extracted model reasoning. Dropped when building chat requests.
    Reasoning(ReasoningItem),
}

impl InputItem {
    /// Creates a user message item from plain text.
    pub fn user(text: impl Into<String>) -> Self {
        InputItem::Message(MessageItem {
            role: ItemRole::User,
            content: MessageContent::Text(text.into()),
        })
    }

    /// Creates a system message item from plain text.
    pub fn system(text: impl Into<String>) -> Self {
        InputItem::Message(MessageItem {
            role: ItemRole::System,
            content: MessageContent::Text(text.into()),
        })
    }

    /// Creates an assistant message item from plain text.
    pub fn assistant(text: impl Into<String>) -> Self {
        InputItem::Message(MessageItem {
            role: ItemRole::Assistant,
            content: MessageContent::Text(text.into()),
        })
    }

    /// Creates a function-call-output item.
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        InputItem::FunctionCallOutput(FunctionCallOutputItem {
            call_id: call_id.into(),
            output: output.into(),
        })
    }
}

// ============================================================================
// TOOL DEFINITIONS
// ============================================================================

/// A caller-supplied function tool with a JSON-schema parameter description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTool {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, surfaced to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the arguments object.
    pub parameters: serde_json::Value,
}

/// Single-shot vector search over one or more stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSearchTool {
    /// Stores to query.
    pub vector_store_ids: Vec<String>,
    /// Result cap (default 10).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_num_results: Option<usize>,
    /// Base attribute filter applied to every query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filter>,
}

/// Web search. The gateway carries the definition through to the backend as
/// a function-shaped stub; execution belongs to an external tool server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchTool {}

/// Iterative LLM-guided vector search (the agentic search engine).
///
/// This is a distinct tool kind from [`WebSearchTool`]; neither is ever
/// inferred from the other at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgenticSearchTool {
    /// Stores to query (at least one).
    pub vector_store_ids: Vec<String>,
    /// Cap on retained results per run (default 10).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    /// Cap on LLM-guided iterations (default 5).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    /// Seed strategy name (`default` or `hybrid`); unknown names fall back
    /// to `default`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_strategy: Option<String>,
    /// Dense/lexical mixing parameter for the hybrid seed (1.0 = dense only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    /// Base attribute filter ANDed into every iteration's search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filter>,
    /// Allow the tuner to move temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_temperature_tuning: Option<bool>,
    /// Allow the tuner to move top-p.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_top_p_tuning: Option<bool>,
    /// Allow the tuner to move presence penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_presence_penalty_tuning: Option<bool>,
    /// Allow the tuner to move frequency penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_frequency_penalty_tuning: Option<bool>,
}

/// The tool sum type: a tagged variant per tool kind sharing the
/// name/description/parameters header through its payload structs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    /// Caller-defined function executed by the caller (or a registry entry).
    Function(FunctionTool),
    /// Built-in single-shot vector search.
    FileSearch(FileSearchTool),
    /// External web search.
    WebSearch(WebSearchTool),
    /// Built-in iterative agentic search.
    AgenticSearch(AgenticSearchTool),
}

impl ToolDefinition {
    /// The name the model uses to invoke this tool. Non-function kinds are
    /// addressed by their type tag.
    pub fn invocation_name(&self) -> &str {
        match self {
            ToolDefinition::Function(f) => &f.name,
            ToolDefinition::FileSearch(_) => "file_search",
            ToolDefinition::WebSearch(_) => "web_search",
            ToolDefinition::AgenticSearch(_) => "agentic_search",
        }
    }
}

/// Tool-choice policy for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `auto`, `none`, or `required`.
    Mode(ToolChoiceMode),
    /// Force a specific function by name.
    Function {
        /// Always `"function"`.
        #[serde(rename = "type")]
        kind: String,
        /// The forced function name.
        name: String,
    },
}

/// The bare tool-choice modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    /// Model decides.
    Auto,
    /// Tools disabled.
    None,
    /// Model must call a tool.
    Required,
}

// ============================================================================
// FORMATTING AND REASONING HINTS
// ============================================================================

/// Requested output text format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextFormat {
    /// Free-form text (default).
    Text,
    /// Any valid JSON object.
    JsonObject,
    /// JSON constrained by a named schema.
    JsonSchema {
        /// Schema name.
        name: String,
        /// The JSON Schema itself.
        schema: serde_json::Value,
        /// Strict schema adherence.
        #[serde(skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
    },
}

/// Wrapper for the `text` request field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOptions {
    /// The requested format.
    pub format: TextFormat,
}

/// Reasoning effort hint passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Minimal reasoning.
    Low,
    /// Balanced.
    Medium,
    /// Maximal reasoning.
    High,
}

/// Wrapper for the `reasoning` request field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningParams {
    /// Requested effort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
}

// ============================================================================
// REQUEST
// ============================================================================

/// An incoming extended-response call.
///
/// Immutable during processing; the orchestrator derives successive internal
/// chat requests from it per loop iteration but never mutates the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRequest {
    /// Free text or an ordered item sequence.
    pub input: ResponseInput,
    /// Model identifier forwarded to the backend.
    pub model: String,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Tools available to the response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Tool-choice policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Stream events instead of returning a single record.
    #[serde(default)]
    pub stream: bool,
    /// Persist the final record to the attached store.
    #[serde(default)]
    pub store: bool,
    /// System-level instructions prepended to the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Continue from a stored response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    /// Reasoning hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningParams>,
    /// Output text formatting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextOptions>,
    /// Per-request tool-call budget override, clamped to the process limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_calls: Option<u32>,
}

impl ResponseRequest {
    /// Creates a minimal request from free text.
    pub fn from_text(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            input: ResponseInput::Text(input.into()),
            model: model.into(),
            temperature: None,
            top_p: None,
            max_output_tokens: None,
            tools: Vec::new(),
            tool_choice: None,
            stream: false,
            store: false,
            instructions: None,
            previous_response_id: None,
            reasoning: None,
            text: None,
            max_tool_calls: None,
        }
    }

    /// Creates a request from an explicit item sequence.
    pub fn from_items(model: impl Into<String>, items: Vec<InputItem>) -> Self {
        let mut req = Self::from_text(model, "");
        req.input = ResponseInput::Items(items);
        req
    }

    /// Normalizes the input to an owned item sequence: free text becomes a
    /// single user message.
    pub fn normalized_input(&self) -> Vec<InputItem> {
        match &self.input {
            ResponseInput::Text(text) => vec![InputItem::user(text.clone())],
            ResponseInput::Items(items) => items.clone(),
        }
    }

    /// Finds the agentic-search tool definition, if the request carries one.
    pub fn agentic_search_tool(&self) -> Option<&AgenticSearchTool> {
        self.tools.iter().find_map(|t| match t {
            ToolDefinition::AgenticSearch(tool) => Some(tool),
            _ => None,
        })
    }

    /// Finds the file-search tool definition, if the request carries one.
    pub fn file_search_tool(&self) -> Option<&FileSearchTool> {
        self.tools.iter().find_map(|t| match t {
            ToolDefinition::FileSearch(tool) => Some(tool),
            _ => None,
        })
    }
}

// ============================================================================
// OUTPUT SIDE
// ============================================================================

/// A URL citation attached to output text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    /// A citation of an external URL.
    UrlCitation {
        /// The cited URL.
        url: String,
        /// Page title, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Start offset in the message text.
        #[serde(skip_serializing_if = "Option::is_none")]
        start_index: Option<usize>,
        /// End offset in the message text.
        #[serde(skip_serializing_if = "Option::is_none")]
        end_index: Option<usize>,
    },
}

/// One content element of an output message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    /// Final text with optional annotations.
    OutputText {
        /// The message text.
        text: String,
        /// URL citations.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        annotations: Vec<Annotation>,
    },
}

/// An assistant message in the final output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMessage {
    /// Item identifier (`msg_...`).
    pub id: String,
    /// Always `assistant`.
    pub role: ItemRole,
    /// Item status (`completed` once finalized).
    pub status: String,
    /// Ordered content elements.
    pub content: Vec<OutputContent>,
}

impl OutputMessage {
    /// Creates a completed assistant message with the given text.
    pub fn text(text: impl Into<String>, annotations: Vec<Annotation>) -> Self {
        Self {
            id: generate_id("msg"),
            role: ItemRole::Assistant,
            status: "completed".to_string(),
            content: vec![OutputContent::OutputText {
                text: text.into(),
                annotations,
            }],
        }
    }

    /// Flattens the message content to plain text.
    pub fn as_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                OutputContent::OutputText { text, .. } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A single element in the final ordered output of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    /// An assistant message.
    Message(OutputMessage),
    /// A (possibly parked) function call.
    FunctionCall(FunctionCallItem),
    /// Extracted reasoning.
    Reasoning(ReasoningItem),
}

/// Token accounting copied from the backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// Prompt-side tokens.
    pub input_tokens: u64,
    /// Completion-side tokens.
    pub output_tokens: u64,
    /// Sum of the two.
    pub total_tokens: u64,
}

/// Terminal and non-terminal states of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Still being produced.
    InProgress,
    /// Finished normally.
    Completed,
    /// Finished early (budget or cancellation).
    Incomplete,
    /// Terminal failure.
    Failed,
}

/// Error payload attached to a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Wire error kind (see [`crate::Error::kind`]).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// The final response record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Response identifier (`resp_...`).
    pub id: String,
    /// Always `"response"`.
    pub object: String,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    /// Current status.
    pub status: ResponseStatus,
    /// Model that produced the response.
    pub model: String,
    /// Ordered output items.
    #[serde(default)]
    pub output: Vec<OutputItem>,
    /// Token accounting, when the backend reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    /// The stored response this one continued from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

impl Response {
    /// Creates a fresh in-progress record for a request. Used as the
    /// `created` / `in_progress` event snapshot.
    pub fn in_progress(req: &ResponseRequest) -> Self {
        Self {
            id: generate_id("resp"),
            object: "response".to_string(),
            created_at: epoch_seconds(),
            status: ResponseStatus::InProgress,
            model: req.model.clone(),
            output: Vec::new(),
            usage: None,
            error: None,
            previous_response_id: req.previous_response_id.clone(),
        }
    }

    /// Concatenated text of all message output items.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message(msg) => Some(msg.as_text()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}
