//! Response Orchestrator: the top-level model↔tools loop.
//!
//! [`ResponseOrchestrator`] drives an extended-response request through one
//! or more backend chat calls. Tool calls the registry resolves are executed
//! server-side and their outputs appended to the working item sequence for
//! the next iteration; unknown tools are parked and the response finalizes
//! immediately so the client can resume by supplying outputs. Two budgets
//! bound every response: a tool-execution count and a wall-clock deadline
//! measured from the `created` snapshot with a single monotonic clock.
//!
//! The streaming path runs as a producer task feeding the ordered event
//! channel; the caller drains the receiver. A dropped receiver (client
//! disconnect) fails the next emit, which stops the producer and, through
//! it, the backend stream and any running tool.

use crate::adapter;
use crate::chat::FinishReason;
use crate::client::ChatBackend;
use crate::config::GatewayConfig;
use crate::dispatcher::{DispatchResult, ToolDispatcher};
use crate::events::{EventEmitter, EventStream, ResponseEvent};
use crate::multiplexer::{IterationOutcome, StreamMultiplexer};
use crate::registry::ToolRegistry;
use crate::store::{ListInputItemsQuery, ResponseStore, StoredInputItem};
use crate::telemetry::{TelemetryEvent, TelemetrySink, default_sink};
use crate::types::{
    FunctionCallItem, InputItem, OutputItem, OutputMessage, Response, ResponseRequest,
    ResponseStatus, Usage,
};
use crate::{Error, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Event-channel depth for streaming responses.
const EVENT_BUFFER: usize = 64;

/// The response orchestration engine (C1).
pub struct ResponseOrchestrator {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ToolRegistry>,
    dispatcher: ToolDispatcher,
    store: Option<Arc<dyn ResponseStore>>,
    telemetry: Arc<dyn TelemetrySink>,
    config: GatewayConfig,
}

impl ResponseOrchestrator {
    /// Creates an orchestrator over a backend and tool registry.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        registry: Arc<ToolRegistry>,
        config: GatewayConfig,
    ) -> Self {
        let telemetry = default_sink();
        let dispatcher = ToolDispatcher::new(registry.clone(), telemetry.clone(), config.tool_grace());
        Self {
            backend,
            registry,
            dispatcher,
            store: None,
            telemetry,
            config,
        }
    }

    /// Attaches a response store.
    pub fn with_store(mut self, store: Arc<dyn ResponseStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.dispatcher =
            ToolDispatcher::new(self.registry.clone(), telemetry.clone(), self.config.tool_grace());
        self.telemetry = telemetry;
        self
    }

    // ========================================================================
    // NON-STREAMING
    // ========================================================================

    /// Creates a response, driving the tool loop to completion.
    pub async fn create(&self, req: &ResponseRequest) -> Result<Response> {
        let mut items = self.working_items(req).await?;
        let response_id = crate::types::generate_id("resp");
        let started = Instant::now();
        let deadline = started + self.config.max_duration();
        let max_tool_calls = self.config.effective_max_tool_calls(req.max_tool_calls);

        // Output items accumulated from intermediate iterations (assistant
        // text that preceded tool calls).
        let mut preserved: Vec<OutputItem> = Vec::new();
        let mut total_resolved: u32 = 0;
        let mut tool_iters: u32 = 0;

        loop {
            if started.elapsed() > self.config.max_duration() {
                return Err(Error::timeout());
            }

            let chat_req = adapter::to_chat_request(req, &items)?;
            let completion = tokio::time::timeout_at(deadline, self.backend.complete(&chat_req))
                .await
                .map_err(|_| Error::timeout())??;

            if adapter::first_finish_reason(&completion) != FinishReason::ToolCalls {
                let mut response = adapter::to_response(&completion, req, &response_id);
                if !preserved.is_empty() {
                    let mut output = std::mem::take(&mut preserved);
                    output.append(&mut response.output);
                    response.output = output;
                }
                self.persist(req, &response, &items).await;
                return Ok(response);
            }

            let choice = completion
                .choices
                .first()
                .ok_or_else(|| Error::upstream(502, "tool_calls finish with no choice"))?;
            let calls: Vec<FunctionCallItem> = choice
                .message
                .tool_calls
                .iter()
                .flatten()
                .map(|call| {
                    FunctionCallItem::new(
                        call.id.clone(),
                        call.function.name.clone(),
                        call.function.arguments.clone(),
                    )
                })
                .collect();

            // Assistant text alongside tool calls is preserved as a message
            // output in addition to processing the calls.
            let text = choice.message.content_text();
            if !text.is_empty() {
                preserved.push(OutputItem::Message(OutputMessage::text(text, Vec::new())));
            }

            if total_resolved >= max_tool_calls {
                return Err(Error::too_many_tool_calls(format!(
                    "budget of {max_tool_calls} tool calls exhausted"
                )));
            }

            let result = self
                .dispatcher
                .dispatch(&calls, req, None, Some(deadline))
                .await?;
            total_resolved += result.resolved;

            if result.has_parked() {
                let mut response = Response {
                    id: response_id,
                    object: "response".to_string(),
                    created_at: completion.created,
                    status: ResponseStatus::Completed,
                    model: completion.model.clone(),
                    output: std::mem::take(&mut preserved),
                    usage: completion.usage.as_ref().map(adapter::usage),
                    error: None,
                    previous_response_id: req.previous_response_id.clone(),
                };
                for parked in &result.parked {
                    // A later call with the same id supersedes the earlier
                    // one in the final output.
                    response.output.retain(|item| {
                        !matches!(item, OutputItem::FunctionCall(c) if c.call_id == parked.call_id)
                    });
                    response.output.push(OutputItem::FunctionCall(parked.clone()));
                }
                items.extend(result.items);
                self.persist(req, &response, &items).await;
                return Ok(response);
            }

            items.extend(result.items);

            if total_resolved > max_tool_calls {
                return Err(Error::too_many_tool_calls(format!(
                    "batch exceeded the budget of {max_tool_calls} tool calls"
                )));
            }

            tool_iters += 1;
            debug!(tool_iters, total_resolved, "tool iteration complete");
        }
    }

    // ========================================================================
    // STREAMING
    // ========================================================================

    /// Creates a streaming response. The returned stream yields the strictly
    /// ordered event sequence ending in exactly one terminal event.
    pub fn create_stream(self: Arc<Self>, req: ResponseRequest) -> EventStream {
        let (emitter, stream) = EventEmitter::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            if let Err(e) = self.run_stream(req, &emitter).await {
                // A dropped receiver means the client went away; anything
                // else is surfaced as the terminal error event.
                if !matches!(e, Error::Stream(_)) {
                    let _ = emitter.emit(ResponseEvent::from_error(&e)).await;
                } else {
                    debug!("stream consumer disconnected");
                }
            }
        });
        stream
    }

    async fn run_stream(&self, req: ResponseRequest, emitter: &EventEmitter) -> Result<()> {
        let snapshot = Response::in_progress(&req);
        let response_id = snapshot.id.clone();
        let started = Instant::now();
        let deadline = started + self.config.max_duration();
        let max_tool_calls = self.config.effective_max_tool_calls(req.max_tool_calls);

        emitter
            .emit(ResponseEvent::Created {
                response: snapshot.clone(),
            })
            .await?;

        let mut items = self.working_items(&req).await?;
        let internal_tools = self.registry.internal_names();

        let mut in_progress_snapshot = Some(snapshot);
        let mut next_output_index = 0usize;
        let mut total_resolved: u32 = 0;
        // (output_index, item) pairs accumulated across iterations, plus the
        // text-done events synthesized at finalization.
        let mut accumulated: Vec<(usize, OutputItem)> = Vec::new();
        let mut pending_text_done: Vec<ResponseEvent> = Vec::new();
        let mut usage: Option<Usage> = None;

        loop {
            if started.elapsed() > self.config.max_duration() {
                return Err(Error::timeout());
            }

            let chat_req = adapter::to_chat_request(&req, &items)?;
            let mut chunks = tokio::time::timeout_at(deadline, self.backend.stream(&chat_req))
                .await
                .map_err(|_| Error::timeout())??;
            let mut mux = StreamMultiplexer::new(
                internal_tools.clone(),
                in_progress_snapshot.take(),
                next_output_index,
            );

            // The deadline applies at every chunk await, so a stalled
            // backend cannot outlive the response budget.
            while let Some(chunk) = tokio::time::timeout_at(deadline, chunks.next())
                .await
                .map_err(|_| Error::timeout())?
            {
                for event in mux.process_chunk(chunk?) {
                    emitter.emit(event).await?;
                }
            }

            next_output_index = mux.next_output_index();
            let outcome = mux.finish();
            if let Some(chat_usage) = &outcome.usage {
                usage = Some(adapter::usage(chat_usage));
            }

            match outcome.finish_reason {
                FinishReason::ToolCalls => {
                    if total_resolved >= max_tool_calls {
                        return Err(Error::too_many_tool_calls(format!(
                            "budget of {max_tool_calls} tool calls exhausted"
                        )));
                    }

                    let calls: Vec<FunctionCallItem> =
                        outcome.tool_calls.iter().map(|tc| tc.item.clone()).collect();
                    let result = self
                        .dispatcher
                        .dispatch(&calls, &req, Some(emitter), Some(deadline))
                        .await?;
                    total_resolved += result.resolved;

                    // Assistant text that preceded the calls is preserved.
                    for (index, message) in &outcome.messages {
                        accumulated.push((*index, OutputItem::Message(message.clone())));
                    }
                    pending_text_done.extend(outcome.text_done.iter().cloned());

                    if result.has_parked() {
                        return self
                            .finalize_parked(
                                &req,
                                emitter,
                                response_id,
                                outcome,
                                result,
                                accumulated,
                                pending_text_done,
                                usage,
                                &mut items,
                            )
                            .await;
                    }

                    items.extend(result.items);

                    if total_resolved > max_tool_calls {
                        return Err(Error::too_many_tool_calls(format!(
                            "batch exceeded the budget of {max_tool_calls} tool calls"
                        )));
                    }
                }
                finish => {
                    for event in pending_text_done.drain(..).chain(outcome.text_done) {
                        emitter.emit(event).await?;
                    }
                    for (index, message) in outcome.messages {
                        accumulated.push((index, OutputItem::Message(message)));
                    }

                    let status = if finish == FinishReason::Stop {
                        ResponseStatus::Completed
                    } else {
                        ResponseStatus::Incomplete
                    };
                    let response =
                        self.build_response(&req, response_id, status, accumulated, usage);
                    if status == ResponseStatus::Completed {
                        self.persist(&req, &response, &items).await;
                        emitter.emit(ResponseEvent::Completed { response }).await?;
                    } else {
                        emitter.emit(ResponseEvent::Incomplete { response }).await?;
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Finalizes a streaming response with parked tool calls: arguments-done
    /// and item-done for the parked calls only, synthesized text-done events,
    /// then `completed` so the client can resume with outputs.
    #[allow(clippy::too_many_arguments)]
    async fn finalize_parked(
        &self,
        req: &ResponseRequest,
        emitter: &EventEmitter,
        response_id: String,
        outcome: IterationOutcome,
        result: DispatchResult,
        mut accumulated: Vec<(usize, OutputItem)>,
        pending_text_done: Vec<ResponseEvent>,
        usage: Option<Usage>,
        items: &mut Vec<InputItem>,
    ) -> Result<()> {
        let parked_ids: Vec<&str> = result.parked.iter().map(|c| c.call_id.as_str()).collect();

        for call in &outcome.tool_calls {
            if !parked_ids.contains(&call.item.call_id.as_str()) {
                continue;
            }
            let item_id = call.item.id.clone().unwrap_or_default();
            emitter
                .emit(ResponseEvent::FunctionCallArgumentsDone {
                    item_id,
                    output_index: call.output_index,
                    arguments: call.item.arguments.clone(),
                })
                .await?;
            emitter
                .emit(ResponseEvent::OutputItemDone {
                    output_index: call.output_index,
                    item: OutputItem::FunctionCall(call.item.clone()),
                })
                .await?;
            // A later call with the same id supersedes the earlier one.
            accumulated.retain(|(_, item)| {
                !matches!(item, OutputItem::FunctionCall(c) if c.call_id == call.item.call_id)
            });
            accumulated.push((call.output_index, OutputItem::FunctionCall(call.item.clone())));
        }

        for event in pending_text_done {
            emitter.emit(event).await?;
        }

        items.extend(result.items);

        let response = self.build_response(
            req,
            response_id,
            ResponseStatus::Completed,
            accumulated,
            usage,
        );
        self.persist(req, &response, items).await;
        emitter.emit(ResponseEvent::Completed { response }).await?;
        Ok(())
    }

    fn build_response(
        &self,
        req: &ResponseRequest,
        response_id: String,
        status: ResponseStatus,
        mut accumulated: Vec<(usize, OutputItem)>,
        usage: Option<Usage>,
    ) -> Response {
        accumulated.sort_by_key(|(index, _)| *index);
        Response {
            id: response_id,
            object: "response".to_string(),
            created_at: crate::types::epoch_seconds(),
            status,
            model: req.model.clone(),
            output: accumulated.into_iter().map(|(_, item)| item).collect(),
            usage,
            error: None,
            previous_response_id: req.previous_response_id.clone(),
        }
    }

    // ========================================================================
    // STORE DELEGATION
    // ========================================================================

    /// Retrieves a stored response.
    pub async fn retrieve(&self, response_id: &str) -> Result<Response> {
        let store = self.require_store()?;
        Ok(store.get(response_id).await?.response)
    }

    /// Deletes a stored response; returns whether it existed.
    pub async fn delete(&self, response_id: &str) -> Result<bool> {
        let store = self.require_store()?;
        store.delete(response_id).await
    }

    /// Pages through a stored response's input items.
    pub async fn list_input_items(
        &self,
        response_id: &str,
        query: &ListInputItemsQuery,
    ) -> Result<Vec<StoredInputItem>> {
        let store = self.require_store()?;
        store.list_input_items(response_id, query).await
    }

    fn require_store(&self) -> Result<&Arc<dyn ResponseStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::config("no response store attached"))
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Normalizes the request input into the working item sequence,
    /// prepending the stored conversation when `previous_response_id` is set.
    async fn working_items(&self, req: &ResponseRequest) -> Result<Vec<InputItem>> {
        let mut items = Vec::new();

        if let Some(previous_id) = &req.previous_response_id {
            let store = self.store.as_ref().ok_or_else(|| {
                Error::invalid_input("previous_response_id requires an attached response store")
            })?;
            let stored = store.get(previous_id).await?;
            items.extend(stored.input_items.into_iter().map(|stored| stored.item));
            for output in stored.response.output {
                items.push(match output {
                    OutputItem::Message(message) => InputItem::assistant(message.as_text()),
                    OutputItem::FunctionCall(call) => InputItem::FunctionCall(call),
                    OutputItem::Reasoning(reasoning) => InputItem::Reasoning(reasoning),
                });
            }
        }

        items.extend(req.normalized_input());
        Ok(items)
    }

    /// Persists a successful response when the request asked for it.
    /// Failures are observed, never propagated: the response already
    /// succeeded.
    async fn persist(&self, req: &ResponseRequest, response: &Response, items: &[InputItem]) {
        if !req.store {
            return;
        }
        let Some(store) = &self.store else {
            warn!(response_id = %response.id, "store=true but no response store attached");
            return;
        };
        if let Err(e) = store.store(response, items).await {
            self.telemetry.record(&TelemetryEvent::PersistenceFailed {
                response_id: response.id.clone(),
                message: e.to_string(),
            });
        }
    }
}
