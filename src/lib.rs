//! # Response Gateway
//!
//! A protocol-bridging gateway core that exposes an extended-response API —
//! single-shot and server-sent-event streaming — in front of a plain
//! chat-completion backend.
//!
//! ## Overview
//!
//! The crate implements two tightly coupled engines:
//!
//! - **Response orchestration**: converts an inbound extended-response
//!   request into one or more chat-completion calls, executes recognized
//!   tools server-side, parks unknown tools for the client, and drives
//!   multi-iteration loops bounded by a tool-call budget and a wall-clock
//!   deadline. In streaming mode, backend deltas are multiplexed into a
//!   strictly ordered typed event sequence.
//! - **Agentic search**: a built-in tool that orchestrates a bounded loop of
//!   vector-store searches in which an LLM reads the results, proposes the
//!   next query with a structured filter, maintains a knowledge memory, and
//!   terminates on sufficiency, repetition, or exhaustion.
//!
//! HTTP transport, authentication, storage engines, and embedding services
//! live outside this crate; the core consumes them through the seam traits
//! [`client::ChatBackend`], [`search::vector::VectorStoreClient`], and
//! [`store::ResponseStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use response_gateway::prelude::*;
//! use std::sync::Arc;
//!
//! # struct MyVectorStore;
//! # #[async_trait::async_trait]
//! # impl response_gateway::search::vector::VectorStoreClient for MyVectorStore {
//! #     async fn search(
//! #         &self,
//! #         _store_id: &str,
//! #         _query: &response_gateway::search::vector::VectorQuery,
//! #     ) -> response_gateway::Result<response_gateway::search::vector::VectorSearchPage> {
//! #         Ok(Default::default())
//! #     }
//! # }
//! #[tokio::main]
//! async fn main() -> response_gateway::Result<()> {
//!     let backend = Arc::new(
//!         HttpChatBackend::builder()
//!             .base_url("http://localhost:1234/v1")
//!             .build()?,
//!     );
//!     let config = GatewayConfig::default();
//!     let registry = Arc::new(ToolRegistry::with_builtins(
//!         backend.clone(),
//!         Arc::new(MyVectorStore),
//!         config.clone(),
//!     ));
//!     let orchestrator = Arc::new(ResponseOrchestrator::new(backend, registry, config));
//!
//!     let request = ResponseRequest::from_text("qwen2.5-32b-instruct", "Hello");
//!     let response = orchestrator.create(&request).await?;
//!     println!("{}", response.output_text());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **orchestrator**: the top-level model↔tools loop, budgets, termination
//! - **multiplexer**: backend chunk stream → ordered typed events
//! - **dispatcher**: tool-call classification, execution, parking
//! - **adapter**: extended-response ↔ chat-completion parameter mapping
//! - **registry**: typed tool descriptors and executors, aliases, built-ins
//! - **search**: the agentic search engine and its subcomponents
//! - **client**: the backend chat seam and its reqwest/SSE implementation
//! - **store**: the optional response store seam
//! - **events**: typed streaming events and the ordered channel
//! - **config**: validated process-wide budgets and defaults
//! - **telemetry**: the structured observation contract
//! - **retry**: network-layer backoff for the backend client

/// Parameter adapter between the extended-response and chat shapes.
pub mod adapter;

/// Chat-completion wire types.
pub mod chat;

/// Backend chat client seam and HTTP implementation.
pub mod client;

/// Process-wide configuration with validation and env overrides.
pub mod config;

/// Tool-call classification and execution.
pub mod dispatcher;

/// Error types and conversions.
mod error;

/// Typed streaming events and the ordered event channel.
pub mod events;

/// Streaming multiplexer turning chunks into events.
pub mod multiplexer;

/// The response orchestration engine.
pub mod orchestrator;

/// Tool registry, descriptors, executors, and built-ins.
pub mod registry;

/// Retry utilities for the backend client.
pub mod retry;

/// The agentic search engine and its subcomponents.
pub mod search;

/// Response store seam and in-memory implementation.
pub mod store;

/// Telemetry sink contract.
pub mod telemetry;

/// Extended-response API types.
pub mod types;

// --- Core re-exports ---

pub use client::{ChatBackend, HttpChatBackend};
pub use config::{GatewayConfig, TuningFlags};
pub use error::{Error, Result};
pub use events::{EventEmitter, EventStream, ResponseEvent};
pub use orchestrator::ResponseOrchestrator;
pub use registry::{ToolDescriptor, ToolExecutor, ToolRegistry};
pub use search::{AgenticSearchEngine, AgenticSearchParams, AgenticSearchResponse};
pub use store::{InMemoryResponseStore, ResponseStore};
pub use types::{
    InputItem, OutputItem, Response, ResponseRequest, ResponseStatus, ToolDefinition,
};

/// Convenience module with the most commonly used types.
/// Import with `use response_gateway::prelude::*;`.
pub mod prelude {
    pub use crate::{
        ChatBackend, Error, GatewayConfig, HttpChatBackend, InMemoryResponseStore, InputItem,
        OutputItem, Response, ResponseEvent, ResponseOrchestrator, ResponseRequest,
        ResponseStatus, Result, ToolDefinition, ToolRegistry,
    };
}
