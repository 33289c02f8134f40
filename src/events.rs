//! Typed streaming events and the ordered event channel.
//!
//! A streaming response is delivered as a strictly ordered sequence of
//! [`ResponseEvent`]s over a single-producer/single-consumer channel: the
//! orchestrator's producer task pushes events through an [`EventEmitter`]
//! while the caller drains the matching receiver stream. The sequence always
//! matches
//!
//! ```text
//! created · in_progress · (delta | item_added | item_done)* · (text_done)* ·
//!     (completed | incomplete | error)
//! ```
//!
//! with exactly one terminal event. A dropped receiver (client disconnect)
//! makes the next `emit` fail, which cancels the producer.

use crate::types::{OutputItem, Response};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Citation payload carried by agentic-search progress events.
#[derive(Debug, Clone, Serialize)]
pub struct SearchCitation {
    /// Source file id.
    pub file_id: String,
    /// Source filename.
    pub filename: String,
    /// Relevance score.
    pub score: f64,
}

/// A single streamed event within a response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseEvent {
    /// First event of every response; carries the in-progress snapshot.
    Created {
        /// The in-progress record.
        response: Response,
    },
    /// Emitted once, on the first non-empty backend chunk.
    InProgress {
        /// The in-progress record.
        response: Response,
    },
    /// A new output item started (function calls announce themselves here).
    OutputItemAdded {
        /// Position in the final output list.
        output_index: usize,
        /// The item, possibly still in progress.
        item: OutputItem,
    },
    /// Incremental message text.
    OutputTextDelta {
        /// Owning item id.
        item_id: String,
        /// Position in the final output list.
        output_index: usize,
        /// The new text fragment.
        delta: String,
    },
    /// Final text of one message index.
    OutputTextDone {
        /// Owning item id.
        item_id: String,
        /// Position in the final output list.
        output_index: usize,
        /// The complete text.
        text: String,
    },
    /// Incremental function-call arguments.
    FunctionCallArgumentsDelta {
        /// Owning item id.
        item_id: String,
        /// Position in the final output list.
        output_index: usize,
        /// The new argument fragment.
        delta: String,
    },
    /// Complete arguments for one function call.
    FunctionCallArgumentsDone {
        /// Owning item id.
        item_id: String,
        /// Position in the final output list.
        output_index: usize,
        /// The concatenated argument string.
        arguments: String,
    },
    /// An output item finished.
    OutputItemDone {
        /// Position in the final output list.
        output_index: usize,
        /// The finished item.
        item: OutputItem,
    },
    /// Terminal: the response completed normally.
    Completed {
        /// The final record.
        response: Response,
    },
    /// Terminal: the response ended early.
    Incomplete {
        /// The final record.
        response: Response,
    },
    /// Terminal: the response failed.
    Error {
        /// Wire error kind.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Agentic-search progress: one query-phase iteration.
    AgenticSearchIteration {
        /// 1-based iteration number.
        iteration: usize,
        /// Iterations left before the cap.
        remaining_iterations: usize,
        /// The query being executed.
        query: String,
        /// Extracted memory of the previous iteration.
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        /// Citations gathered so far.
        citations: Vec<SearchCitation>,
    },
}

impl ResponseEvent {
    /// The wire `event:` kind string.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseEvent::Created { .. } => "response.created",
            ResponseEvent::InProgress { .. } => "response.in_progress",
            ResponseEvent::OutputItemAdded { .. } => "response.output_item.added",
            ResponseEvent::OutputTextDelta { .. } => "response.output_text.delta",
            ResponseEvent::OutputTextDone { .. } => "response.output_text.done",
            ResponseEvent::FunctionCallArgumentsDelta { .. } => {
                "response.function_call_arguments.delta"
            }
            ResponseEvent::FunctionCallArgumentsDone { .. } => {
                "response.function_call_arguments.done"
            }
            ResponseEvent::OutputItemDone { .. } => "response.output_item.done",
            ResponseEvent::Completed { .. } => "response.completed",
            ResponseEvent::Incomplete { .. } => "response.incomplete",
            ResponseEvent::Error { .. } => "response.error",
            ResponseEvent::AgenticSearchIteration { .. } => {
                "response.agentic_search.query_phase.iteration"
            }
        }
    }

    /// Whether this event terminates the response stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseEvent::Completed { .. }
                | ResponseEvent::Incomplete { .. }
                | ResponseEvent::Error { .. }
        )
    }

    /// Renders the event as a server-sent-events frame for the HTTP layer.
    ///
    /// The kind is merged into the payload object so `data` stays
    /// self-describing even without the `event:` line.
    pub fn to_sse(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Some(obj) = value.as_object_mut() {
            obj.insert("type".to_string(), json!(self.kind()));
        }
        format!("event: {}\ndata: {}\n\n", self.kind(), value)
    }

    /// Builds the terminal error event for a gateway [`Error`].
    pub fn from_error(err: &Error) -> Self {
        ResponseEvent::Error {
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Stream of events as handed to the caller of `create_stream`.
pub type EventStream = ReceiverStream<ResponseEvent>;

/// Sending half of the ordered event channel.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<ResponseEvent>,
}

impl EventEmitter {
    /// Creates a bounded channel pair. The receiver side is the stream the
    /// HTTP layer drains.
    pub fn channel(buffer: usize) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, ReceiverStream::new(rx))
    }

    /// Emits one event in order.
    ///
    /// # Errors
    ///
    /// Fails with a stream error when the receiver is gone (client
    /// disconnect); the producer must stop on that signal.
    pub async fn emit(&self, event: ResponseEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::stream("event receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseRequest;
    use tokio_stream::StreamExt;

    #[test]
    fn test_event_kinds() {
        let req = ResponseRequest::from_text("m1", "hi");
        let snapshot = Response::in_progress(&req);
        assert_eq!(
            ResponseEvent::Created {
                response: snapshot.clone()
            }
            .kind(),
            "response.created"
        );
        assert_eq!(
            ResponseEvent::OutputTextDelta {
                item_id: "msg_1".to_string(),
                output_index: 0,
                delta: "A".to_string()
            }
            .kind(),
            "response.output_text.delta"
        );
        assert_eq!(
            ResponseEvent::AgenticSearchIteration {
                iteration: 1,
                remaining_iterations: 4,
                query: "q".to_string(),
                reasoning: None,
                citations: vec![]
            }
            .kind(),
            "response.agentic_search.query_phase.iteration"
        );
    }

    #[test]
    fn test_terminal_classification() {
        let req = ResponseRequest::from_text("m1", "hi");
        let snapshot = Response::in_progress(&req);
        assert!(
            ResponseEvent::Completed {
                response: snapshot.clone()
            }
            .is_terminal()
        );
        assert!(
            ResponseEvent::Error {
                code: "timeout".to_string(),
                message: "deadline".to_string()
            }
            .is_terminal()
        );
        assert!(
            !ResponseEvent::InProgress { response: snapshot }.is_terminal()
        );
    }

    #[test]
    fn test_sse_frame_shape() {
        let event = ResponseEvent::OutputTextDelta {
            item_id: "msg_1".to_string(),
            output_index: 0,
            delta: "Hello".to_string(),
        };
        let frame = event.to_sse();
        assert!(frame.starts_with("event: response.output_text.delta\n"));
        assert!(frame.contains("\ndata: "));
        assert!(frame.ends_with("\n\n"));

        let data_line = frame
            .lines()
            .find(|l| l.starts_with("data: "))
            .unwrap()
            .trim_start_matches("data: ");
        let value: serde_json::Value = serde_json::from_str(data_line).unwrap();
        assert_eq!(value["type"], "response.output_text.delta");
        assert_eq!(value["delta"], "Hello");
    }

    #[test]
    fn test_error_event_from_gateway_error() {
        let event = ResponseEvent::from_error(&Error::timeout());
        match &event {
            ResponseEvent::Error { code, .. } => assert_eq!(code, "timeout"),
            _ => panic!("expected error event"),
        }
    }

    #[tokio::test]
    async fn test_channel_preserves_order() {
        let (emitter, mut stream) = EventEmitter::channel(16);
        for i in 0..3 {
            emitter
                .emit(ResponseEvent::OutputTextDelta {
                    item_id: "msg_1".to_string(),
                    output_index: 0,
                    delta: i.to_string(),
                })
                .await
                .unwrap();
        }
        drop(emitter);

        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            if let ResponseEvent::OutputTextDelta { delta, .. } = event {
                seen.push(delta);
            }
        }
        assert_eq!(seen, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_emit_fails_after_receiver_drop() {
        let (emitter, stream) = EventEmitter::channel(1);
        drop(stream);
        let result = emitter
            .emit(ResponseEvent::Error {
                code: "timeout".to_string(),
                message: "late".to_string(),
            })
            .await;
        assert!(result.is_err());
    }
}
