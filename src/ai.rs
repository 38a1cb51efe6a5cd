//! Structured commit message generation against hosted and local models.

pub mod anthropic;
pub mod cost;
pub mod error;
pub mod format;
pub mod gemini;
pub mod generator;
pub mod model_config;
pub mod openai;
pub mod partial_json;
pub mod provider;
pub mod schema;
#[cfg(test)]
pub(crate) mod test_utils;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};

pub use cost::calculate_cost;
pub use error::AiError;
pub use format::format_partial;
pub use generator::{CommitGenerator, CommitInput, GenerationEvent, Notifier, ProgressSink};
pub use provider::{resolve, AiProvider, ClientFactory, Credentials, ModelSelection, ProviderResolver};
pub use schema::{CommitBodyItem, CommitMessage, PartialBodyItem, PartialCommitMessage};

/// Connect timeout for provider requests.
///
/// Streaming responses are not bounded by a total timeout; their duration is
/// governed by the provider and by caller cancellation.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata about an AI client implementation.
#[derive(Clone, Debug)]
pub struct AiClientMetadata {
    /// Provider the client talks to.
    pub provider: AiProvider,
    /// Model identifier.
    pub model: String,
    /// Base URL requests are sent to.
    pub base_url: String,
}

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Total tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Folds a later usage report into this one.
    ///
    /// Providers report counts cumulatively and sometimes split across
    /// events (input at start, output at end); zero never overwrites a count.
    pub fn merge(&mut self, other: TokenUsage) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
    }
}

/// Event emitted by a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Next fragment of the JSON text of the structured object.
    TextDelta(String),
    /// Usage counts.
    Usage(TokenUsage),
    /// The provider finished generating.
    Finish {
        /// Provider-specific finish reason.
        reason: Option<String>,
    },
}

/// Boxed stream of provider events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, AiError>> + Send>>;

/// Output schema handed to providers, in the dialects they accept.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    /// Schema (and tool) name.
    pub name: String,
    /// What the object represents.
    pub description: String,
    /// JSON Schema in strict form: every property required, optional ones nullable.
    pub json_schema: serde_json::Value,
    /// OpenAPI subset accepted by Gemini (`nullable` instead of type unions).
    pub openapi_schema: serde_json::Value,
}

/// One structured-generation request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// System instruction.
    pub system_prompt: String,
    /// User message.
    pub user_prompt: String,
    /// Schema the output must follow.
    pub schema: OutputSchema,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token limit.
    pub max_tokens: u32,
    /// Ask the provider for its native strict structured-output mode.
    pub structured_outputs: bool,
}

impl StructuredRequest {
    /// System prompt with the schema spelled out, for providers that only
    /// offer a free-form JSON mode.
    #[must_use]
    pub fn system_prompt_with_schema(&self) -> String {
        format!(
            "{}\n\nRespond only with a JSON object matching this JSON Schema:\n{}",
            self.system_prompt,
            serde_json::to_string_pretty(&self.schema.json_schema).unwrap_or_default()
        )
    }
}

/// Trait for streaming structured-output clients.
pub trait AiClient: Send + Sync {
    /// Opens a streaming structured-output request.
    ///
    /// Dropping the returned stream aborts the underlying connection.
    fn stream_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, AiError>> + Send + 'a>>;

    /// Returns metadata about the client.
    fn get_metadata(&self) -> AiClientMetadata;
}

// ── Shared helpers for AI client implementations ────────────────────

/// Builds an HTTP client for streaming requests.
pub(crate) fn build_http_client() -> Result<Client, AiError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| AiError::InvalidConfiguration(format!("Failed to build HTTP client: {e}")))
}

/// Joins a base URL and a path without doubling slashes.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Maps an error status and body to the error taxonomy.
///
/// A 400/422 that complains about the response format, schema or tool use
/// means the provider does not support what was asked of it.
pub(crate) fn classify_error_response(status: StatusCode, body: &str) -> AiError {
    let lower = body.to_lowercase();
    let capability_rejected = (status == StatusCode::BAD_REQUEST
        || status == StatusCode::UNPROCESSABLE_ENTITY)
        && (lower.contains("response_format")
            || lower.contains("json_schema")
            || lower.contains("responseschema")
            || lower.contains("tool_choice")
            || lower.contains("not supported")
            || lower.contains("unsupported"));

    if capability_rejected {
        AiError::UnsupportedFunctionality(format!("HTTP {status}: {body}"))
    } else {
        AiError::ApiRequestFailed(format!("HTTP {status}: {body}"))
    }
}

/// Checks an HTTP response for error status.
///
/// On success, returns the response unchanged for further processing.
pub(crate) async fn check_error_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, AiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_else(|e| {
        tracing::debug!("Failed to read error response body: {e}");
        String::new()
    });
    Err(classify_error_response(status, &error_text))
}

/// Decodes a streaming response body as server-sent events, yielding the
/// `data` payload of each event.
pub(crate) fn sse_data(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, AiError>> + Send {
    response.bytes_stream().eventsource().map(|event| match event {
        Ok(event) => Ok(event.data),
        Err(EventStreamError::Transport(e)) => Err(AiError::NetworkError(e.to_string())),
        Err(e) => Err(AiError::InvalidResponseFormat(e.to_string())),
    })
}
