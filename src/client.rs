//! Backend chat client: the seam to the chat-completion service.
//!
//! [`ChatBackend`] is the contract the orchestrator consumes — one
//! single-shot call and one streaming call. [`HttpChatBackend`] implements it
//! against an OpenAI-compatible `/chat/completions` endpoint over reqwest,
//! owning the concerns the orchestrator must not: per-call timeouts,
//! transient-failure retry, bearer auth, and SSE chunk parsing.
//!
//! Tests and embedded deployments substitute their own `ChatBackend`; the
//! integration suites script one with queued completions.

use crate::chat::{ChatChunk, ChatCompletion, ChatRequest};
use crate::retry::{RetryConfig, retry_transient};
use crate::{Error, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// Stream of parsed backend chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// The backend chat-completion contract consumed by the orchestrator and the
/// agentic-search engine.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Executes a single-shot completion.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion>;

    /// Opens a streaming completion. The returned stream yields parsed
    /// chunks until the backend closes it.
    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream>;
}

/// HTTP implementation of [`ChatBackend`] for OpenAI-compatible servers.
///
/// # Examples
///
/// ```rust,no_run
/// use response_gateway::client::HttpChatBackend;
///
/// let backend = HttpChatBackend::builder()
///     .base_url("http://localhost:1234/v1")
///     .api_key("not-needed")
///     .build()
///     .unwrap();
/// ```
pub struct HttpChatBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl HttpChatBackend {
    /// Creates a new builder.
    pub fn builder() -> HttpChatBackendBuilder {
        HttpChatBackendBuilder::default()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::upstream(status, body));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let mut request = request.clone();
        request.stream = false;

        retry_transient(self.retry.clone(), || async {
            let response = self.send(&request).await?;
            let completion = response.json::<ChatCompletion>().await.map_err(Error::Http)?;
            Ok(completion)
        })
        .await
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let mut request = request.clone();
        request.stream = true;

        // Retry covers connection establishment only; once chunks flow the
        // stream is not replayed.
        let response = retry_transient(self.retry.clone(), || self.send(&request)).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        // The stream ends with a `data: [DONE]` sentinel.
                        if event.data == "[DONE]" {
                            return None;
                        }
                        match serde_json::from_str::<ChatChunk>(&event.data) {
                            Ok(chunk) => Some(Ok(chunk)),
                            Err(e) => Some(Err(Error::stream(format!(
                                "failed to parse chunk: {e}"
                            )))),
                        }
                    }
                    Err(e) => Some(Err(Error::stream(format!("SSE transport error: {e}")))),
                }
            });

        Ok(Box::pin(stream))
    }
}

/// Builder for [`HttpChatBackend`] with URL validation.
#[derive(Debug, Default)]
pub struct HttpChatBackendBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    retry: Option<RetryConfig>,
}

impl HttpChatBackendBuilder {
    /// Sets the API endpoint URL (required). Must start with `http://` or
    /// `https://`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the bearer API key. Local servers usually accept the default
    /// `not-needed`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the per-call HTTP timeout (default 120s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the transient-retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Validates and builds the backend client.
    pub fn build(self) -> Result<HttpChatBackend> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::config("base_url is required"))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::config(
                "base_url must start with http:// or https://",
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(120)))
            .build()
            .map_err(Error::Http)?;

        Ok(HttpChatBackend {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.unwrap_or_else(|| "not-needed".to_string()),
            retry: self.retry.unwrap_or_default(),
        })
    }
}
