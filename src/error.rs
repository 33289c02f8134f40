//! Error types for the response gateway.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway core.
///
/// Variants map one-to-one onto the wire error kinds surfaced in
/// `response.error` events; see [`Error::kind`].
#[derive(Error, Debug)]
pub enum Error {
    /// Bad request shape
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Orchestrator tool-call budget exceeded
    #[error("too many tool calls: {0}")]
    TooManyToolCalls(String),

    /// Response-level wall-clock budget exceeded
    #[error("response deadline exceeded")]
    Timeout,

    /// Backend chat-completion failure, with the upstream status code
    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// A tool executor failed
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// Tool arguments were not valid JSON
    #[error("bad tool arguments: {0}")]
    BadArguments(String),

    /// A tool did not observe cancellation within the grace window
    #[error("tool ignored cancellation: {0}")]
    ToolCancelled(String),

    /// Agentic-search decision could not be parsed after retries
    #[error("decision parse failure: {0}")]
    ParseFailure(String),

    /// Agentic-search pre-seed returned nothing
    #[error("no results: {0}")]
    NoResults(String),

    /// Store lookup missed
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Streaming protocol error
    #[error("streaming error: {0}")]
    Stream(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new tool-budget error
    pub fn too_many_tool_calls(msg: impl Into<String>) -> Self {
        Error::TooManyToolCalls(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Create a new upstream error carrying the backend status code
    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        Error::Upstream {
            status,
            message: msg.into(),
        }
    }

    /// Create a new tool-execution error
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Error::ToolExecution(msg.into())
    }

    /// Create a new bad-arguments error
    pub fn bad_arguments(msg: impl Into<String>) -> Self {
        Error::BadArguments(msg.into())
    }

    /// Create a new tool-cancelled error
    pub fn tool_cancelled(msg: impl Into<String>) -> Self {
        Error::ToolCancelled(msg.into())
    }

    /// Create a new parse-failure error
    pub fn parse_failure(msg: impl Into<String>) -> Self {
        Error::ParseFailure(msg.into())
    }

    /// Create a new no-results error
    pub fn no_results(msg: impl Into<String>) -> Self {
        Error::NoResults(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// The wire kind string used in `response.error` payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid-input",
            Error::TooManyToolCalls(_) => "too-many-tool-calls",
            Error::Timeout => "timeout",
            Error::Upstream { .. } => "upstream",
            Error::ToolExecution(_) => "tool-execution",
            Error::BadArguments(_) => "bad-arguments",
            Error::ToolCancelled(_) => "tool-cancelled",
            Error::ParseFailure(_) => "parse-failure",
            Error::NoResults(_) => "no-results",
            Error::NotFound(_) => "not-found",
            Error::Config(_) => "config",
            Error::Stream(_) => "stream",
            Error::Http(_) => "upstream",
            Error::Json(_) => "invalid-input",
        }
    }

    /// Whether the error is recoverable within a response by surfacing it to
    /// the model as a tool output. Orchestrator-scoped kinds are terminal.
    pub fn is_tool_scoped(&self) -> bool {
        matches!(self, Error::ToolExecution(_) | Error::BadArguments(_))
    }
}
