//! OpenAI-compatible Chat Completions client (OpenAI, Mistral, Ollama).

use std::future::Future;
use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::ai::error::AiError;
use crate::ai::model_config::{get_model_registry, MaxTokensParam};
use crate::ai::provider::{AiProvider, DEFAULT_OLLAMA_BASE_URL};
use crate::ai::{
    build_http_client, check_error_response, join_url, sse_data, AiClient, AiClientMetadata,
    EventStream, StreamEvent, StructuredRequest, TokenUsage,
};

/// OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com";
/// Mistral API base URL.
pub const MISTRAL_API_BASE: &str = "https://api.mistral.ai";

/// End-of-stream sentinel sent as the last SSE payload.
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Serialize, Debug)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    description: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat<'a> {
    JsonSchema { json_schema: JsonSchemaFormat<'a> },
    JsonObject,
}

#[derive(Serialize, Debug)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat<'a>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Deserialize, Debug, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize, Debug)]
struct ChunkError {
    message: String,
}

/// One streamed `chat.completion.chunk`.
#[derive(Deserialize, Debug)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<Usage>,
    error: Option<ChunkError>,
}

/// Translates one SSE payload into stream events; `None` marks the end.
fn decode_chunk(data: &str) -> Result<Option<Vec<StreamEvent>>, AiError> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| AiError::InvalidResponseFormat(format!("Malformed completion chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(AiError::ApiRequestFailed(error.message));
    }

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            events.push(StreamEvent::TextDelta(content));
        }
        if let Some(reason) = choice.finish_reason {
            events.push(StreamEvent::Finish {
                reason: Some(reason),
            });
        }
    }
    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }
    Ok(Some(events))
}

/// Streaming client for any Chat Completions compatible endpoint.
pub struct OpenAiCompatibleClient {
    client: Client,
    provider: AiProvider,
    /// Not sent when absent (Ollama).
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiCompatibleClient {
    fn new(
        provider: AiProvider,
        model: String,
        api_key: Option<String>,
        base_url: String,
    ) -> Result<Self, AiError> {
        Ok(Self {
            client: build_http_client()?,
            provider,
            api_key,
            model,
            base_url,
        })
    }

    /// Creates a client for OpenAI.
    pub fn new_openai(model: String, api_key: String) -> Result<Self, AiError> {
        Self::new(AiProvider::OpenAi, model, Some(api_key), OPENAI_API_BASE.to_string())
    }

    /// Creates a client for Mistral.
    pub fn new_mistral(model: String, api_key: String) -> Result<Self, AiError> {
        Self::new(AiProvider::Mistral, model, Some(api_key), MISTRAL_API_BASE.to_string())
    }

    /// Creates a client for a local Ollama server.
    pub fn new_ollama(model: String, base_url: Option<String>) -> Result<Self, AiError> {
        Self::new(
            AiProvider::Ollama,
            model,
            None,
            base_url.unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string()),
        )
    }

    /// Points the client at another endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Only OpenAI enforces a JSON schema natively; the others get JSON mode.
    fn uses_json_schema(&self, request: &StructuredRequest) -> bool {
        self.provider == AiProvider::OpenAi && request.structured_outputs
    }

    /// System prompt, with the schema spelled out when the provider cannot enforce it.
    fn system_prompt(&self, request: &StructuredRequest) -> String {
        if self.uses_json_schema(request) {
            request.system_prompt.clone()
        } else {
            request.system_prompt_with_schema()
        }
    }

    fn build_request<'a>(
        &'a self,
        request: &'a StructuredRequest,
        system_prompt: &'a str,
    ) -> ChatRequest<'a> {
        let capabilities = get_model_registry().get_capabilities(self.provider, &self.model);

        let response_format = if self.uses_json_schema(request) {
            ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: &request.schema.name,
                    description: &request.schema.description,
                    schema: &request.schema.json_schema,
                    strict: true,
                },
            }
        } else {
            ResponseFormat::JsonObject
        };

        let (max_tokens, max_completion_tokens) = match capabilities.max_tokens_param {
            MaxTokensParam::MaxTokens => (Some(request.max_tokens), None),
            MaxTokensParam::MaxCompletionTokens => (None, Some(request.max_tokens)),
        };

        // Mistral rejects stream_options and reports usage on the last chunk anyway.
        let stream_options = (self.provider != AiProvider::Mistral).then_some(StreamOptions {
            include_usage: true,
        });

        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt,
                },
                Message {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens,
            max_completion_tokens,
            temperature: capabilities
                .supports_temperature
                .then_some(request.temperature),
            response_format,
            stream: true,
            stream_options,
        }
    }
}

impl AiClient for OpenAiCompatibleClient {
    fn stream_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, AiError>> + Send + 'a>> {
        Box::pin(async move {
            let system_prompt = self.system_prompt(request);
            let body = self.build_request(request, &system_prompt);

            debug!(
                provider = %self.provider,
                model = %self.model,
                max_tokens = ?body.max_tokens,
                max_completion_tokens = ?body.max_completion_tokens,
                temperature = ?body.temperature,
                json_schema = self.uses_json_schema(request),
                "Built chat completions request payload"
            );

            let url = join_url(&self.base_url, "v1/chat/completions");
            info!(url = %url, model = %self.model, "Sending streaming request to OpenAI-compatible API");

            let mut builder = self
                .client
                .post(&url)
                .header("accept", "text/event-stream")
                .json(&body);
            if let Some(ref api_key) = self.api_key {
                builder = builder.bearer_auth(api_key);
            }
            let response = check_error_response(builder.send().await?).await?;

            let mut data = Box::pin(sse_data(response));
            let events: EventStream = Box::pin(stream! {
                while let Some(item) = data.next().await {
                    match item.and_then(|payload| decode_chunk(&payload)) {
                        Ok(Some(decoded)) => {
                            for event in decoded {
                                yield Ok::<StreamEvent, AiError>(event);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }
            });
            Ok(events)
        })
    }

    fn get_metadata(&self) -> AiClientMetadata {
        AiClientMetadata {
            provider: self.provider,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}
