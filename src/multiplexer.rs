//! Streaming Multiplexer: turns backend chat chunks into the canonical
//! response event sequence.
//!
//! Tool calls arrive as incremental deltas across chunks — the first fragment
//! for an index usually carries the call id and function name, later
//! fragments carry argument string pieces that may split JSON at arbitrary
//! byte positions:
//!
//! ```text
//! Chunk 1: { tool_calls: [{ index: 0, id: "call_abc", function: { name: "get_weather" } }] }
//! Chunk 2: { tool_calls: [{ index: 0, function: { arguments: "{\"loc" } }] }
//! Chunk 3: { tool_calls: [{ index: 0, function: { arguments: "ation\":\"Paris\"}" } }] }
//! Chunk 4: { finish_reason: "tool_calls" }
//! ```
//!
//! The multiplexer accumulates this per-iteration state, assigns each new
//! item a global output index, and emits events per the ordering rules:
//! text deltas stream verbatim as they arrive; non-internal tool calls
//! announce themselves with `output_item.added` and stream argument deltas;
//! tool calls the gateway resolves internally are buffered silently and only
//! surface through the dispatcher. [`StreamMultiplexer::finish`] flushes the
//! accumulated state into the iteration outcome the orchestrator acts on.

use crate::chat::{ChatChunk, ChatUsage, FinishReason};
use crate::events::ResponseEvent;
use crate::types::{FunctionCallItem, OutputMessage, Response, generate_id};
use std::collections::{BTreeMap, HashSet};

/// A tool call fully assembled from deltas.
#[derive(Debug, Clone)]
pub struct MultiplexedToolCall {
    /// Output index assigned when the call first appeared.
    pub output_index: usize,
    /// The assembled function-call item (id, call id, name, concatenated
    /// arguments).
    pub item: FunctionCallItem,
    /// Whether the gateway resolves this tool internally (deltas were
    /// suppressed).
    pub internal: bool,
}

/// What one backend iteration produced.
#[derive(Debug)]
pub struct IterationOutcome {
    /// Finish reason of the iteration (defaults to `stop` when the backend
    /// closed the stream without one).
    pub finish_reason: FinishReason,
    /// `output_text.done` events, one per accumulated text index, in order.
    pub text_done: Vec<ResponseEvent>,
    /// Completed message items paired with their output indices, in order.
    pub messages: Vec<(usize, OutputMessage)>,
    /// Assembled tool calls in delta-index order.
    pub tool_calls: Vec<MultiplexedToolCall>,
    /// Usage from the final chunk, when the backend reported it.
    pub usage: Option<ChatUsage>,
}

#[derive(Debug)]
struct TextState {
    output_index: usize,
    item_id: String,
    buffer: String,
}

#[derive(Debug, Default)]
struct ToolCallState {
    output_index: usize,
    item_id: String,
    call_id: Option<String>,
    name: Option<String>,
    arguments: String,
    internal: bool,
    announced: bool,
}

/// Per-iteration chunk accumulator.
///
/// Output indices are global across iterations: construct each iteration's
/// multiplexer with the accumulator's current index and read
/// [`StreamMultiplexer::next_output_index`] back after `finish`.
pub struct StreamMultiplexer {
    internal_tools: HashSet<String>,
    /// `in_progress` snapshot, consumed on the first non-empty chunk of the
    /// first iteration only.
    in_progress_snapshot: Option<Response>,
    next_output_index: usize,
    text: BTreeMap<u32, TextState>,
    tool_calls: BTreeMap<u32, ToolCallState>,
    finish_reason: Option<FinishReason>,
    usage: Option<ChatUsage>,
}

impl StreamMultiplexer {
    /// Creates a multiplexer for one iteration.
    ///
    /// `internal_tools` holds the names whose deltas are suppressed (the
    /// registry resolves them server-side). `in_progress_snapshot` is given
    /// only on the first iteration so `in_progress` is emitted at most once
    /// per response.
    pub fn new(
        internal_tools: HashSet<String>,
        in_progress_snapshot: Option<Response>,
        start_output_index: usize,
    ) -> Self {
        Self {
            internal_tools,
            in_progress_snapshot,
            next_output_index: start_output_index,
            text: BTreeMap::new(),
            tool_calls: BTreeMap::new(),
            finish_reason: None,
            usage: None,
        }
    }

    /// The next free output index; read after [`finish`](Self::finish) to
    /// seed the next iteration.
    pub fn next_output_index(&self) -> usize {
        self.next_output_index
    }

    /// Processes one backend chunk, returning the events it triggers in
    /// order.
    pub fn process_chunk(&mut self, chunk: ChatChunk) -> Vec<ResponseEvent> {
        let mut events = Vec::new();

        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        for choice in chunk.choices {
            let empty = choice.delta.content.is_none()
                && choice.delta.tool_calls.is_none()
                && choice.finish_reason.is_none();
            if !empty {
                if let Some(snapshot) = self.in_progress_snapshot.take() {
                    events.push(ResponseEvent::InProgress { response: snapshot });
                }
            }

            if let Some(content) = choice.delta.content {
                let state = self.text.entry(choice.index).or_insert_with(|| {
                    let output_index = self.next_output_index;
                    self.next_output_index += 1;
                    TextState {
                        output_index,
                        item_id: generate_id("msg"),
                        buffer: String::new(),
                    }
                });
                state.buffer.push_str(&content);
                events.push(ResponseEvent::OutputTextDelta {
                    item_id: state.item_id.clone(),
                    output_index: state.output_index,
                    delta: content,
                });
            }

            if let Some(deltas) = choice.delta.tool_calls {
                for delta in deltas {
                    let state = self.tool_calls.entry(delta.index).or_insert_with(|| {
                        let output_index = self.next_output_index;
                        self.next_output_index += 1;
                        ToolCallState {
                            output_index,
                            item_id: generate_id("fc"),
                            ..Default::default()
                        }
                    });

                    if let Some(id) = delta.id {
                        state.call_id = Some(id);
                    }

                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            state.internal = self.internal_tools.contains(&name);
                            state.name = Some(name);
                            // Announce the call unless the gateway will
                            // resolve it internally.
                            if !state.internal && !state.announced {
                                state.announced = true;
                                events.push(ResponseEvent::OutputItemAdded {
                                    output_index: state.output_index,
                                    item: crate::types::OutputItem::FunctionCall(
                                        FunctionCallItem {
                                            id: Some(state.item_id.clone()),
                                            call_id: state.call_id.clone().unwrap_or_default(),
                                            name: state.name.clone().unwrap_or_default(),
                                            arguments: state.arguments.clone(),
                                        },
                                    ),
                                });
                            }
                        }
                        if let Some(fragment) = function.arguments {
                            state.arguments.push_str(&fragment);
                            if state.announced {
                                events.push(ResponseEvent::FunctionCallArgumentsDelta {
                                    item_id: state.item_id.clone(),
                                    output_index: state.output_index,
                                    delta: fragment,
                                });
                            }
                        }
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }

        events
    }

    /// Flushes the accumulated state into the iteration outcome.
    ///
    /// Tool calls missing an id or name are dropped; their fragments never
    /// formed a dispatchable call.
    pub fn finish(self) -> IterationOutcome {
        let mut text_done = Vec::new();
        let mut messages = Vec::new();
        for (_, state) in self.text {
            text_done.push(ResponseEvent::OutputTextDone {
                item_id: state.item_id.clone(),
                output_index: state.output_index,
                text: state.buffer.clone(),
            });
            let mut message = OutputMessage::text(state.buffer, Vec::new());
            message.id = state.item_id;
            messages.push((state.output_index, message));
        }

        let tool_calls = self
            .tool_calls
            .into_values()
            .filter_map(|state| {
                let call_id = state.call_id?;
                let name = state.name?;
                Some(MultiplexedToolCall {
                    output_index: state.output_index,
                    item: FunctionCallItem {
                        id: Some(state.item_id),
                        call_id,
                        name,
                        arguments: state.arguments,
                    },
                    internal: state.internal,
                })
            })
            .collect();

        IterationOutcome {
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
            text_done,
            messages,
            tool_calls,
            usage: self.usage,
        }
    }
}
