//! Chat-completion wire types.
//!
//! These types mirror the OpenAI-compatible chat-completions format the
//! backend speaks: a request with a flat message list, a single-shot
//! completion with choices, and streaming chunks carrying incremental deltas.
//! They are deliberately separate from the extended-response types in
//! [`crate::types`] — the Parameter Adapter translates between the two shapes.
//!
//! # Streaming
//!
//! Tool calls arrive fragmented across chunks: the first delta for an index
//! usually carries the call id and function name, subsequent deltas carry
//! argument string fragments that must be concatenated before parsing. The
//! Streaming Multiplexer owns that accumulation.

use serde::{Deserialize, Serialize};

// ============================================================================
// REQUEST
// ============================================================================

/// Content of a chat message: a bare string or an array of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    /// Simple text (the common case).
    Text(String),
    /// Multipart content for multimodal messages.
    Parts(Vec<ChatContentPart>),
}

/// One part of a multipart chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    /// Text part.
    Text {
        /// The text content.
        text: String,
    },
    /// Image part.
    #[serde(rename = "image_url")]
    ImageUrl {
        /// URL payload with optional detail.
        image_url: ChatImageUrl,
    },
    /// File part (by id or inline data).
    File {
        /// File payload.
        file: ChatFilePart,
    },
}

/// Image URL payload for multipart messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatImageUrl {
    /// Image URL or data URI.
    pub url: String,
    /// Detail level: `low`, `high`, or `auto`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// File payload for multipart messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFilePart {
    /// Identifier of an uploaded file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Inline base64 data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    /// Original filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A message in the chat-completion wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role string (`system`, `developer`, `user`, `assistant`, `tool`).
    pub role: String,
    /// Message content; absent for assistant messages that only carry
    /// tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ChatContent>,
    /// Tool calls requested by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    /// The call this tool message responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// URL annotations attached by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<ChatAnnotation>>,
}

impl ChatMessage {
    /// Creates a plain text message with the given role.
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(ChatContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            annotations: None,
        }
    }

    /// Creates a tool message answering `tool_call_id`.
    pub fn tool_output(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(ChatContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            annotations: None,
        }
    }

    /// Flattens the content to plain text (text parts joined by newlines).
    pub fn content_text(&self) -> String {
        match &self.content {
            None => String::new(),
            Some(ChatContent::Text(text)) => text.clone(),
            Some(ChatContent::Parts(parts)) => parts
                .iter()
                .filter_map(|p| match p {
                    ChatContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A URL annotation on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnnotation {
    /// Annotation kind (`url_citation`).
    #[serde(rename = "type")]
    pub kind: String,
    /// The citation payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_citation: Option<ChatUrlCitation>,
}

/// URL citation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUrlCitation {
    /// The cited URL.
    pub url: String,
    /// Page title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Start offset in the message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    /// End offset in the message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
}

/// A complete tool call on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCall {
    /// Unique call identifier.
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub call_type: String,
    /// Function name and raw argument string.
    pub function: ChatFunction,
}

impl ChatToolCall {
    /// Creates a function tool call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: ChatFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name plus arguments. The arguments are a JSON **string**, not an
/// object, and must be parsed before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFunction {
    /// Function/tool name.
    pub name: String,
    /// Raw JSON argument string.
    pub arguments: String,
}

/// Response-format request field (`text`, `json_object`, `json_schema`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatResponseFormat {
    /// Free-form text.
    Text,
    /// Any valid JSON object.
    JsonObject,
    /// JSON constrained by a schema.
    JsonSchema {
        /// The schema envelope.
        json_schema: serde_json::Value,
    },
}

/// Complete request payload for the chat-completions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Whether to stream the response.
    pub stream: bool,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Presence penalty (used by the agentic-search decision calls).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Frequency penalty (used by the agentic-search decision calls).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// Tool definitions in function-calling format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    /// Tool-choice policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    /// Requested response format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ChatResponseFormat>,
    /// Reasoning effort hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl ChatRequest {
    /// Creates a minimal non-streaming request.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            max_tokens: None,
            temperature: None,
            top_p: None,
            presence_penalty: None,
            frequency_penalty: None,
            tools: None,
            tool_choice: None,
            response_format: None,
            reasoning_effort: None,
        }
    }
}

// ============================================================================
// SINGLE-SHOT COMPLETION
// ============================================================================

/// Why a choice stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural completion.
    Stop,
    /// The model requested tool calls.
    ToolCalls,
    /// Hit the output token cap.
    Length,
    /// Blocked by a content policy.
    ContentFilter,
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChoice {
    /// Choice index.
    pub index: u32,
    /// The assistant message.
    pub message: ChatMessage,
    /// Termination cause.
    pub finish_reason: Option<FinishReason>,
}

/// Token accounting as the backend reports it.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct ChatUsage {
    /// Prompt-side tokens.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion-side tokens.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Sum of the two.
    #[serde(default)]
    pub total_tokens: u64,
}

/// A complete (non-streaming) chat completion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletion {
    /// Completion identifier.
    pub id: String,
    /// Creation time, epoch seconds.
    pub created: i64,
    /// Model that answered.
    pub model: String,
    /// Completion choices (the orchestrator inspects the first).
    pub choices: Vec<ChatChoice>,
    /// Token accounting.
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

// ============================================================================
// STREAMING CHUNKS
// ============================================================================

/// A single chunk of a streamed completion.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    /// Completion identifier, shared by all chunks of one response.
    #[allow(dead_code)]
    pub id: String,
    /// Per-chunk choices (usually one).
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Usage, reported on the final chunk by some backends.
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

/// One choice in a streaming chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    /// Choice index.
    #[allow(dead_code)]
    #[serde(default)]
    pub index: u32,
    /// Incremental updates in this chunk.
    pub delta: ChunkDelta,
    /// Present only on the final chunk of the choice.
    pub finish_reason: Option<FinishReason>,
}

/// The incremental update of one chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    /// Role, present only on the first chunk.
    #[allow(dead_code)]
    pub role: Option<String>,
    /// New text tokens.
    pub content: Option<String>,
    /// Incremental tool-call fragments.
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// An incremental update to one tool call, routed by `index`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    /// Which tool call this fragment belongs to.
    pub index: u32,
    /// Call id, present only in the first fragment.
    pub id: Option<String>,
    /// Function name and/or argument fragment.
    pub function: Option<FunctionDelta>,
}

/// Incremental function name/argument data.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDelta {
    /// Function name, present only in the first fragment.
    pub name: Option<String>,
    /// A fragment of the JSON argument string.
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serialization_skips_absent_fields() {
        let request = ChatRequest::new("m1", vec![ChatMessage::text("user", "Hello")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "m1");
        assert_eq!(json["stream"], false);
        assert!(json.get("temperature").is_none());
        assert!(json.get("tools").is_none());
        assert!(json.get("presence_penalty").is_none());
    }

    #[test]
    fn test_finish_reason_deserialization() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{
                "id": "cmpl_1",
                "created": 1700000000,
                "model": "m1",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hi"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
            }"#,
        )
        .unwrap();
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn test_tool_call_finish_reason() {
        let choice: ChatChoice = serde_json::from_str(
            r#"{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"SF\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }"#,
        )
        .unwrap();
        assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
        let calls = choice.message.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "get_weather");
    }

    #[test]
    fn test_chunk_delta_deserialization() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{
                "id": "cmpl_1",
                "choices": [{
                    "index": 0,
                    "delta": {
                        "tool_calls": [{
                            "index": 0,
                            "id": "c1",
                            "function": {"name": "search", "arguments": "{\"q"}
                        }]
                    },
                    "finish_reason": null
                }]
            }"#,
        )
        .unwrap();
        let delta = &chunk.choices[0].delta;
        let calls = delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, 0);
        assert_eq!(calls[0].id.as_deref(), Some("c1"));
        assert_eq!(
            calls[0].function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"q")
        );
    }

    #[test]
    fn test_message_content_text_flattening() {
        let msg = ChatMessage {
            role: "user".to_string(),
            content: Some(ChatContent::Parts(vec![
                ChatContentPart::Text {
                    text: "a".to_string(),
                },
                ChatContentPart::ImageUrl {
                    image_url: ChatImageUrl {
                        url: "https://example.com/x.png".to_string(),
                        detail: Some("auto".to_string()),
                    },
                },
                ChatContentPart::Text {
                    text: "b".to_string(),
                },
            ])),
            tool_calls: None,
            tool_call_id: None,
            annotations: None,
        };
        assert_eq!(msg.content_text(), "a\nb");
    }

    #[test]
    fn test_tool_output_message() {
        let msg = ChatMessage::tool_output("c1", "{\"ok\":true}");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
    }
}
