//! Telemetry sink: the observation contract the orchestrator emits into.
//!
//! The core does not own exporters; it records structured happenings through
//! [`TelemetrySink`] and lets the hosting layer decide where they go.
//! [`LogSink`] (the default) forwards everything to `tracing`; [`NoopSink`]
//! drops everything, which keeps tests quiet.

use std::sync::Arc;
use tracing::{info, warn};

/// A structured happening worth observing.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A tool executed successfully.
    ToolExecuted {
        /// Canonical tool name.
        name: String,
        /// The originating call id.
        call_id: String,
        /// Wall-clock execution time.
        duration_ms: u128,
    },
    /// A tool failed; the error was surfaced to the model as its output.
    ToolFailed {
        /// Canonical tool name.
        name: String,
        /// The originating call id.
        call_id: String,
        /// Wire error kind (`tool-execution`, `bad-arguments`, ...).
        kind: &'static str,
        /// Failure detail.
        message: String,
    },
    /// The model emitted two tool calls sharing one call id.
    DuplicateToolCall {
        /// The shared call id.
        call_id: String,
    },
    /// Persisting a finished response failed; the response itself already
    /// succeeded.
    PersistenceFailed {
        /// The response that could not be stored.
        response_id: String,
        /// Failure detail.
        message: String,
    },
}

/// Receiver of telemetry events. Implementations must be cheap; the
/// orchestrator records on its hot path.
pub trait TelemetrySink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &TelemetryEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::ToolExecuted {
                name,
                call_id,
                duration_ms,
            } => {
                info!(tool = %name, call_id = %call_id, duration_ms, "tool executed");
            }
            TelemetryEvent::ToolFailed {
                name,
                call_id,
                kind,
                message,
            } => {
                warn!(tool = %name, call_id = %call_id, kind, message = %message, "tool failed");
            }
            TelemetryEvent::DuplicateToolCall { call_id } => {
                warn!(call_id = %call_id, "duplicate tool call id");
            }
            TelemetryEvent::PersistenceFailed {
                response_id,
                message,
            } => {
                warn!(response_id = %response_id, message = %message, "response persistence failed");
            }
        }
    }
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record(&self, _event: &TelemetryEvent) {}
}

/// The default sink.
pub fn default_sink() -> Arc<dyn TelemetrySink> {
    Arc::new(LogSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Collects events for assertions.
    pub(crate) struct CapturingSink {
        pub events: Mutex<Vec<TelemetryEvent>>,
    }

    impl CapturingSink {
        pub(crate) fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
    }

    impl TelemetrySink for CapturingSink {
        fn record(&self, event: &TelemetryEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_capturing_sink_records() {
        let sink = CapturingSink::new();
        sink.record(&TelemetryEvent::DuplicateToolCall {
            call_id: "c1".to_string(),
        });
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TelemetryEvent::DuplicateToolCall { .. }
        ));
    }

    #[test]
    fn test_noop_and_log_sinks_accept_events() {
        let event = TelemetryEvent::ToolExecuted {
            name: "think".to_string(),
            call_id: "c1".to_string(),
            duration_ms: 3,
        };
        NoopSink.record(&event);
        LogSink.record(&event);
    }
}
