//! Tool Dispatcher: classifies tool calls and produces follow-up input items.
//!
//! Each assembled tool call lands in one of three buckets:
//!
//! - **resolved** — the registry knows the (alias-resolved) name; the
//!   executor runs and its output becomes a `function_call_output` item,
//! - **parked** — the name is unknown; the call item is appended without an
//!   output and handed back to the client to resolve,
//! - **failed** — arguments were not valid JSON or the executor threw; the
//!   stringified error becomes the tool output so the model can recover on
//!   the next iteration.
//!
//! Resolved calls in one batch run concurrently only when every one of them
//! is declared parallel-safe; either way the produced items are appended in
//! the tool-call iteration order, so the working sequence is deterministic.

use crate::events::EventEmitter;
use crate::registry::{ToolInvocation, ToolRegistry};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::{FunctionCallItem, InputItem, ResponseRequest};
use crate::{Error, Result};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// What one dispatch batch produced.
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Items to append to the working sequence, in tool-call order:
    /// each function-call item followed by its output item when one exists.
    pub items: Vec<InputItem>,
    /// How many calls were executed (counts against the tool budget).
    pub resolved: u32,
    /// Calls parked for the client to resolve.
    pub parked: Vec<FunctionCallItem>,
}

impl DispatchResult {
    /// Whether any call was parked; the orchestrator finalizes immediately
    /// so the client can supply the outputs.
    pub fn has_parked(&self) -> bool {
        !self.parked.is_empty()
    }
}

enum Classified {
    Resolved { parallel_safe: bool },
    Parked,
}

/// Classifies and executes tool calls against the registry.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    tool_grace: Duration,
}

impl ToolDispatcher {
    /// Creates a dispatcher over a shared registry.
    pub fn new(
        registry: Arc<ToolRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
        tool_grace: Duration,
    ) -> Self {
        Self {
            registry,
            telemetry,
            tool_grace,
        }
    }

    /// Dispatches one batch of tool calls.
    ///
    /// `deadline` is the response's wall-clock budget; a tool still running
    /// past it gets [`Self::tool_grace`] to observe cancellation before its
    /// outcome is synthesized as `tool-cancelled` (terminal for the
    /// response).
    pub async fn dispatch(
        &self,
        calls: &[FunctionCallItem],
        request: &ResponseRequest,
        emitter: Option<&EventEmitter>,
        deadline: Option<Instant>,
    ) -> Result<DispatchResult> {
        let mut result = DispatchResult::default();

        // Duplicate call ids are reported once each to the executors; the
        // orchestrator lets the later output item supersede the earlier one.
        let mut seen_ids = HashSet::new();
        for call in calls {
            if !seen_ids.insert(call.call_id.clone()) {
                warn!(call_id = %call.call_id, "duplicate tool call id in batch");
                self.telemetry.record(&TelemetryEvent::DuplicateToolCall {
                    call_id: call.call_id.clone(),
                });
            }
        }

        let classified: Vec<Classified> = calls
            .iter()
            .map(|call| match self.registry.find(&call.name) {
                Some(descriptor) => Classified::Resolved {
                    parallel_safe: descriptor.parallel_safe,
                },
                None => Classified::Parked,
            })
            .collect();

        let all_parallel_safe = classified.iter().all(|c| match c {
            Classified::Resolved { parallel_safe } => *parallel_safe,
            Classified::Parked => true,
        });
        let resolved_count = classified
            .iter()
            .filter(|c| matches!(c, Classified::Resolved { .. }))
            .count();

        // Outputs per call, aligned with the input order.
        let outputs: Vec<Option<Result<Option<String>>>> =
            if all_parallel_safe && resolved_count > 1 {
                let futures = calls.iter().zip(&classified).map(|(call, class)| {
                    let run = matches!(class, Classified::Resolved { .. });
                    async move {
                        if run {
                            Some(self.execute_one(call, request, emitter, deadline).await)
                        } else {
                            None
                        }
                    }
                });
                join_all(futures).await
            } else {
                let mut collected = Vec::with_capacity(calls.len());
                for (call, class) in calls.iter().zip(&classified) {
                    if matches!(class, Classified::Resolved { .. }) {
                        collected.push(Some(
                            self.execute_one(call, request, emitter, deadline).await,
                        ));
                    } else {
                        collected.push(None);
                    }
                }
                collected
            };

        for ((call, class), output) in calls.iter().zip(&classified).zip(outputs) {
            match class {
                Classified::Parked => {
                    result.items.push(InputItem::FunctionCall(call.clone()));
                    result.parked.push(call.clone());
                }
                Classified::Resolved { .. } => {
                    result.resolved += 1;
                    result.items.push(InputItem::FunctionCall(call.clone()));
                    match output.expect("resolved call always has an outcome") {
                        Ok(Some(text)) => {
                            result
                                .items
                                .push(InputItem::function_output(call.call_id.clone(), text));
                        }
                        // "No output to append": the call item stands alone.
                        Ok(None) => {}
                        Err(e) if e.is_tool_scoped() => {
                            self.telemetry.record(&TelemetryEvent::ToolFailed {
                                name: call.name.clone(),
                                call_id: call.call_id.clone(),
                                kind: e.kind(),
                                message: e.to_string(),
                            });
                            result.items.push(InputItem::function_output(
                                call.call_id.clone(),
                                e.to_string(),
                            ));
                        }
                        // Cancellation and other orchestrator-scoped errors
                        // are terminal for the response.
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(result)
    }

    async fn execute_one(
        &self,
        call: &FunctionCallItem,
        request: &ResponseRequest,
        emitter: Option<&EventEmitter>,
        deadline: Option<Instant>,
    ) -> Result<Option<String>> {
        // Arguments must at least be valid JSON before an executor sees them.
        if serde_json::from_str::<serde_json::Value>(&call.arguments).is_err()
            && !call.arguments.trim().is_empty()
        {
            return Err(Error::bad_arguments(format!(
                "tool `{}` received unparseable arguments",
                call.name
            )));
        }

        let name = self.registry.resolve_name(&call.name).to_string();
        let executor = self
            .registry
            .executor(&name)
            .ok_or_else(|| Error::tool_execution(format!("no executor for tool `{name}`")))?;

        let invocation = ToolInvocation {
            name: &name,
            arguments: &call.arguments,
            call_id: &call.call_id,
            request,
            emitter,
        };

        let started = Instant::now();
        let outcome = match deadline {
            Some(deadline) => {
                let limit = deadline
                    .saturating_duration_since(Instant::now())
                    .saturating_add(self.tool_grace);
                match tokio::time::timeout(limit, executor.execute(invocation)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        return Err(Error::tool_cancelled(format!(
                            "tool `{name}` ignored cancellation past the grace window"
                        )));
                    }
                }
            }
            None => executor.execute(invocation).await,
        };

        if outcome.is_ok() {
            self.telemetry.record(&TelemetryEvent::ToolExecuted {
                name: name.clone(),
                call_id: call.call_id.clone(),
                duration_ms: started.elapsed().as_millis(),
            });
        }
        outcome
    }
}
