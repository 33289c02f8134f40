//! Parameter Adapter: bidirectional mapping between the extended-response
//! shape and the chat-completion shape.
//!
//! The forward direction ([`to_chat_request`]) walks the working item
//! sequence and translates each item by role: messages become chat messages,
//! function calls become assistant tool-call messages, function-call outputs
//! become tool messages keyed by the same call id, and reasoning items are
//! dropped (backend-agnostic). Tool definitions convert too: function tools
//! pass their schema through, while file-search / web-search / agentic-search
//! entries become function-shaped stubs named after their type — the backend
//! never executes them, the orchestrator intercepts any invocation.
//!
//! The reverse direction ([`to_response`]) converts one completion choice
//! into an ordered output list, extracting a `<think>...</think>` prefix into
//! a reasoning item and preserving URL-citation annotations.

use crate::chat::{
    ChatAnnotation, ChatCompletion, ChatContent, ChatContentPart, ChatFilePart, ChatImageUrl,
    ChatMessage, ChatRequest, ChatResponseFormat, ChatToolCall, ChatUsage, FinishReason,
};
use crate::types::{
    Annotation, ContentPart, FunctionCallItem, InputItem, MessageContent, OutputItem,
    OutputMessage, ReasoningEffort, ReasoningItem, Response, ResponseRequest, ResponseStatus,
    TextFormat, ToolChoice, ToolChoiceMode, ToolDefinition, Usage, generate_id,
};
use crate::{Error, Result};
use serde_json::json;

/// Builds the chat request for one loop iteration from the original request
/// plus the working item sequence.
pub fn to_chat_request(req: &ResponseRequest, items: &[InputItem]) -> Result<ChatRequest> {
    let mut messages = Vec::new();

    if let Some(instructions) = &req.instructions {
        if !instructions.is_empty() {
            messages.push(ChatMessage::text("system", instructions.clone()));
        }
    }

    for item in items {
        match item {
            InputItem::Message(message) => {
                messages.push(convert_message(message)?);
            }
            InputItem::FunctionCall(call) => {
                messages.push(ChatMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: Some(vec![ChatToolCall::function(
                        call.call_id.clone(),
                        call.name.clone(),
                        call.arguments.clone(),
                    )]),
                    tool_call_id: None,
                    annotations: None,
                });
            }
            InputItem::FunctionCallOutput(output) => {
                messages.push(ChatMessage::tool_output(
                    output.call_id.clone(),
                    output.output.clone(),
                ));
            }
            // Reasoning items never cross the backend boundary.
            InputItem::Reasoning(_) => {}
        }
    }

    let tools = if req.tools.is_empty() {
        None
    } else {
        Some(req.tools.iter().map(tool_to_chat_format).collect())
    };

    Ok(ChatRequest {
        model: req.model.clone(),
        messages,
        stream: false,
        max_tokens: req.max_output_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        presence_penalty: None,
        frequency_penalty: None,
        tools,
        tool_choice: req.tool_choice.as_ref().map(tool_choice_to_chat_format),
        response_format: req.text.as_ref().map(|t| format_to_chat(&t.format)),
        reasoning_effort: req.reasoning.as_ref().and_then(|r| r.effort).map(|e| {
            match e {
                ReasoningEffort::Low => "low",
                ReasoningEffort::Medium => "medium",
                ReasoningEffort::High => "high",
            }
            .to_string()
        }),
    })
}

fn convert_message(message: &crate::types::MessageItem) -> Result<ChatMessage> {
    let role = message.role.as_str().to_string();
    let content = match &message.content {
        MessageContent::Text(text) => ChatContent::Text(text.clone()),
        MessageContent::Parts(parts) => {
            let mut converted = Vec::with_capacity(parts.len());
            for part in parts {
                converted.push(convert_part(part)?);
            }
            ChatContent::Parts(converted)
        }
    };
    Ok(ChatMessage {
        role,
        content: Some(content),
        tool_calls: None,
        tool_call_id: None,
        annotations: None,
    })
}

fn convert_part(part: &ContentPart) -> Result<ChatContentPart> {
    match part {
        ContentPart::InputText { text } => Ok(ChatContentPart::Text { text: text.clone() }),
        ContentPart::InputImage { image_url, detail } => {
            if image_url.is_empty() {
                return Err(Error::invalid_input("image part with empty URL"));
            }
            Ok(ChatContentPart::ImageUrl {
                image_url: ChatImageUrl {
                    url: image_url.clone(),
                    detail: Some(detail.to_string()),
                },
            })
        }
        ContentPart::InputFile {
            file_id,
            file_data,
            filename,
        } => {
            if file_id.is_none() && file_data.is_none() {
                return Err(Error::invalid_input(
                    "file part requires file_id or file_data",
                ));
            }
            Ok(ChatContentPart::File {
                file: ChatFilePart {
                    file_id: file_id.clone(),
                    file_data: file_data.clone(),
                    filename: filename.clone(),
                },
            })
        }
    }
}

/// Converts one tool definition to the chat function-calling format.
///
/// Non-function kinds become stubs whose name equals the tool's type so the
/// orchestrator can intercept calls to them.
pub fn tool_to_chat_format(tool: &ToolDefinition) -> serde_json::Value {
    match tool {
        ToolDefinition::Function(function) => json!({
            "type": "function",
            "function": {
                "name": function.name,
                "description": function.description.clone().unwrap_or_default(),
                "parameters": function.parameters,
            }
        }),
        ToolDefinition::FileSearch(_) => builtin_stub(
            "file_search",
            "Search the configured vector stores for relevant passages.",
        ),
        ToolDefinition::WebSearch(_) => builtin_stub("web_search", "Search the web."),
        ToolDefinition::AgenticSearch(_) => builtin_stub(
            "agentic_search",
            "Iteratively search the configured vector stores to answer a question.",
        ),
    }
}

fn builtin_stub(name: &str, description: &str) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What to search for"}
                },
                "required": ["query"]
            }
        }
    })
}

fn tool_choice_to_chat_format(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Mode(ToolChoiceMode::Auto) => json!("auto"),
        ToolChoice::Mode(ToolChoiceMode::None) => json!("none"),
        ToolChoice::Mode(ToolChoiceMode::Required) => json!("required"),
        ToolChoice::Function { name, .. } => json!({
            "type": "function",
            "function": {"name": name}
        }),
    }
}

fn format_to_chat(format: &TextFormat) -> ChatResponseFormat {
    match format {
        TextFormat::Text => ChatResponseFormat::Text,
        TextFormat::JsonObject => ChatResponseFormat::JsonObject,
        TextFormat::JsonSchema {
            name,
            schema,
            strict,
        } => ChatResponseFormat::JsonSchema {
            json_schema: json!({
                "name": name,
                "schema": schema,
                "strict": strict.unwrap_or(false),
            }),
        },
    }
}

/// Splits a `<think>...</think>` prefix off assistant content.
///
/// Returns `(reasoning, visible_text)`; reasoning is `None` when the content
/// does not start with a think block.
pub fn split_think_prefix(content: &str) -> (Option<String>, String) {
    let trimmed = content.trim_start();
    let Some(rest) = trimmed.strip_prefix("<think>") else {
        return (None, content.to_string());
    };
    match rest.find("</think>") {
        Some(end) => {
            let reasoning = rest[..end].trim().to_string();
            let visible = rest[end + "</think>".len()..]
                .trim_start_matches(['\n', '\r'])
                .to_string();
            (
                (!reasoning.is_empty()).then_some(reasoning),
                visible,
            )
        }
        // Unterminated think block: treat everything as reasoning.
        None => {
            let reasoning = rest.trim().to_string();
            ((!reasoning.is_empty()).then_some(reasoning), String::new())
        }
    }
}

fn convert_annotations(annotations: Option<&Vec<ChatAnnotation>>) -> Vec<Annotation> {
    annotations
        .map(|list| {
            list.iter()
                .filter_map(|a| {
                    a.url_citation.as_ref().map(|c| Annotation::UrlCitation {
                        url: c.url.clone(),
                        title: c.title.clone(),
                        start_index: c.start_index,
                        end_index: c.end_index,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Converts a single-shot completion into a completed response record.
///
/// The first choice is used: a `<think>` prefix becomes a reasoning item,
/// the remaining text a message output with any URL citations, and each tool
/// call a function-call output item preserving call id, name, and arguments.
pub fn to_response(chat: &ChatCompletion, req: &ResponseRequest, response_id: &str) -> Response {
    let mut output = Vec::new();

    if let Some(choice) = chat.choices.first() {
        let content = choice.message.content_text();
        let (reasoning, visible) = split_think_prefix(&content);

        if let Some(reasoning) = reasoning {
            output.push(OutputItem::Reasoning(ReasoningItem {
                id: Some(generate_id("rs")),
                text: reasoning,
            }));
        }

        if !visible.is_empty()
            || choice
                .message
                .tool_calls
                .as_ref()
                .is_none_or(|calls| calls.is_empty())
        {
            output.push(OutputItem::Message(OutputMessage::text(
                visible,
                convert_annotations(choice.message.annotations.as_ref()),
            )));
        }

        if let Some(calls) = &choice.message.tool_calls {
            for call in calls {
                output.push(OutputItem::FunctionCall(FunctionCallItem::new(
                    call.id.clone(),
                    call.function.name.clone(),
                    call.function.arguments.clone(),
                )));
            }
        }
    }

    Response {
        id: response_id.to_string(),
        object: "response".to_string(),
        created_at: chat.created,
        status: ResponseStatus::Completed,
        model: chat.model.clone(),
        output,
        usage: chat.usage.as_ref().map(usage),
        error: None,
        previous_response_id: req.previous_response_id.clone(),
    }
}

/// Maps backend token accounting onto the response usage counts.
pub fn usage(chat_usage: &ChatUsage) -> Usage {
    Usage {
        input_tokens: chat_usage.prompt_tokens,
        output_tokens: chat_usage.completion_tokens,
        total_tokens: chat_usage.total_tokens,
    }
}

/// The finish reason of the first choice, defaulting to `stop` when the
/// backend omits it.
pub fn first_finish_reason(chat: &ChatCompletion) -> FinishReason {
    chat.choices
        .first()
        .and_then(|c| c.finish_reason)
        .unwrap_or(FinishReason::Stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatChoice;
    use crate::types::{ItemRole, MessageItem, TextOptions};

    fn completion(message: ChatMessage, finish: FinishReason) -> ChatCompletion {
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

    #[test]
    fn test_free_text_becomes_user_message() {
        let req = ResponseRequest::from_text("m1", "Hello");
        let chat = to_chat_request(&req, &req.normalized_input()).unwrap();
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, "user");
        assert_eq!(chat.messages[0].content_text(), "Hello");
    }

    #[test]
    fn test_instructions_prepend_system_message() {
        let mut req = ResponseRequest::from_text("m1", "Hello");
        req.instructions = Some("Be brief.".to_string());
        let chat = to_chat_request(&req, &req.normalized_input()).unwrap();
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[0].content_text(), "Be brief.");
        assert_eq!(chat.messages[1].role, "user");
    }

    #[test]
    fn test_developer_role_passes_through() {
        let items = vec![InputItem::Message(MessageItem {
            role: ItemRole::Developer,
            content: MessageContent::Text("Prefer JSON.".to_string()),
        })];
        let req = ResponseRequest::from_items("m1", items.clone());
        let chat = to_chat_request(&req, &items).unwrap();
        assert_eq!(chat.messages[0].role, "developer");
    }

    #[test]
    fn test_function_call_pair_roundtrip() {
        let items = vec![
            InputItem::user("weather?"),
            InputItem::FunctionCall(FunctionCallItem {
                id: None,
                call_id: "c1".to_string(),
                name: "get_weather".to_string(),
                arguments: r#"{"city":"SF"}"#.to_string(),
            }),
            InputItem::function_output("c1", r#"{"temp":64}"#),
        ];
        let req = ResponseRequest::from_items("m1", items.clone());
        let chat = to_chat_request(&req, &items).unwrap();

        assert_eq!(chat.messages.len(), 3);
        let assistant = &chat.messages[1];
        assert_eq!(assistant.role, "assistant");
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.name, "get_weather");

        let tool = &chat.messages[2];
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_reasoning_items_are_dropped() {
        let items = vec![
            InputItem::Reasoning(ReasoningItem {
                id: None,
                text: "internal".to_string(),
            }),
            InputItem::user("q"),
        ];
        let req = ResponseRequest::from_items("m1", items.clone());
        let chat = to_chat_request(&req, &items).unwrap();
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, "user");
    }

    #[test]
    fn test_multipart_conversion() {
        let items = vec![InputItem::Message(MessageItem {
            role: ItemRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::InputText {
                    text: "what is this".to_string(),
                },
                ContentPart::InputImage {
                    image_url: "https://example.com/x.png".to_string(),
                    detail: crate::types::ImageDetail::High,
                },
                ContentPart::InputFile {
                    file_id: Some("file_1".to_string()),
                    file_data: None,
                    filename: Some("notes.txt".to_string()),
                },
            ]),
        })];
        let req = ResponseRequest::from_items("m1", items.clone());
        let chat = to_chat_request(&req, &items).unwrap();
        match chat.messages[0].content.as_ref().unwrap() {
            ChatContent::Parts(parts) => {
                assert_eq!(parts.len(), 3);
                match &parts[1] {
                    ChatContentPart::ImageUrl { image_url } => {
                        assert_eq!(image_url.detail.as_deref(), Some("high"));
                    }
                    _ => panic!("expected image part"),
                }
            }
            _ => panic!("expected multipart content"),
        }
    }

    #[test]
    fn test_malformed_file_part_is_invalid_input() {
        let items = vec![InputItem::Message(MessageItem {
            role: ItemRole::User,
            content: MessageContent::Parts(vec![ContentPart::InputFile {
                file_id: None,
                file_data: None,
                filename: Some("ghost.txt".to_string()),
            }]),
        })];
        let req = ResponseRequest::from_items("m1", items.clone());
        let result = to_chat_request(&req, &items);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_builtin_tools_become_function_stubs() {
        let mut req = ResponseRequest::from_text("m1", "q");
        req.tools = vec![
            ToolDefinition::FileSearch(crate::types::FileSearchTool {
                vector_store_ids: vec!["vs_1".to_string()],
                max_num_results: None,
                filters: None,
            }),
            ToolDefinition::WebSearch(Default::default()),
        ];
        let chat = to_chat_request(&req, &req.normalized_input()).unwrap();
        let tools = chat.tools.unwrap();
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "file_search");
        assert_eq!(tools[1]["function"]["name"], "web_search");
    }

    #[test]
    fn test_sampling_and_format_mapping() {
        let mut req = ResponseRequest::from_text("m1", "q");
        req.temperature = Some(0.2);
        req.top_p = Some(0.9);
        req.max_output_tokens = Some(256);
        req.text = Some(TextOptions {
            format: TextFormat::JsonObject,
        });
        req.reasoning = Some(crate::types::ReasoningParams {
            effort: Some(ReasoningEffort::High),
        });
        let chat = to_chat_request(&req, &req.normalized_input()).unwrap();
        assert_eq!(chat.temperature, Some(0.2));
        assert_eq!(chat.top_p, Some(0.9));
        assert_eq!(chat.max_tokens, Some(256));
        assert!(matches!(
            chat.response_format,
            Some(ChatResponseFormat::JsonObject)
        ));
        assert_eq!(chat.reasoning_effort.as_deref(), Some("high"));
    }

    #[test]
    fn test_split_think_prefix() {
        let (reasoning, visible) = split_think_prefix("<think>check units</think>\n64°F");
        assert_eq!(reasoning.as_deref(), Some("check units"));
        assert_eq!(visible, "64°F");

        let (reasoning, visible) = split_think_prefix("plain answer");
        assert!(reasoning.is_none());
        assert_eq!(visible, "plain answer");

        let (reasoning, visible) = split_think_prefix("<think>never closed");
        assert_eq!(reasoning.as_deref(), Some("never closed"));
        assert_eq!(visible, "");
    }

    #[test]
    fn test_to_response_plain_text() {
        let req = ResponseRequest::from_text("m1", "Hello");
        let chat = completion(ChatMessage::text("assistant", "Hi"), FinishReason::Stop);
        let response = to_response(&chat, &req, "resp_test");
        assert_eq!(response.status, ResponseStatus::Completed);
        assert_eq!(response.output_text(), "Hi");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_to_response_extracts_think_prefix() {
        let req = ResponseRequest::from_text("m1", "Hello");
        let chat = completion(
            ChatMessage::text("assistant", "<think>units are F</think>\n64°F"),
            FinishReason::Stop,
        );
        let response = to_response(&chat, &req, "resp_test");
        assert_eq!(response.output.len(), 2);
        match &response.output[0] {
            OutputItem::Reasoning(r) => assert_eq!(r.text, "units are F"),
            _ => panic!("expected reasoning first"),
        }
        assert_eq!(response.output_text(), "64°F");
    }

    #[test]
    fn test_to_response_preserves_tool_calls_and_text() {
        let req = ResponseRequest::from_text("m1", "Hello");
        let message = ChatMessage {
            role: "assistant".to_string(),
            content: Some(ChatContent::Text("checking".to_string())),
            tool_calls: Some(vec![ChatToolCall::function(
                "c1",
                "get_weather",
                r#"{"city":"SF"}"#,
            )]),
            tool_call_id: None,
            annotations: None,
        };
        let chat = completion(message, FinishReason::ToolCalls);
        let response = to_response(&chat, &req, "resp_test");
        assert_eq!(response.output.len(), 2);
        match &response.output[1] {
            OutputItem::FunctionCall(call) => {
                assert_eq!(call.call_id, "c1");
                assert_eq!(call.name, "get_weather");
            }
            _ => panic!("expected function call"),
        }
    }

    #[test]
    fn test_to_response_empty_content_yields_empty_message() {
        let req = ResponseRequest::from_text("m1", "Hello");
        let chat = completion(ChatMessage::text("assistant", ""), FinishReason::Stop);
        let response = to_response(&chat, &req, "resp_test");
        assert_eq!(response.output.len(), 1);
        assert_eq!(response.output_text(), "");
        assert!(response.error.is_none());
    }

    #[test]
    fn test_first_finish_reason_default() {
        let chat = completion(ChatMessage::text("assistant", "x"), FinishReason::Stop);
        assert_eq!(first_finish_reason(&chat), FinishReason::Stop);
    }
}
