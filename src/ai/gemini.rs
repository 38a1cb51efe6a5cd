//! Google Gemini client.

use std::future::Future;
use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::ai::error::AiError;
use crate::ai::model_config::get_model_registry;
use crate::ai::provider::AiProvider;
use crate::ai::{
    build_http_client, check_error_response, join_url, sse_data, AiClient, AiClientMetadata,
    EventStream, StreamEvent, StructuredRequest, TokenUsage,
};

/// Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize, Debug)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a Value>,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Deserialize, Debug, Default)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: ResponseContent,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct UsageMetadata {
    prompt_token_count: u64,
    candidates_token_count: u64,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<ApiError>,
}

fn decode_chunk(data: &str) -> Result<Vec<StreamEvent>, AiError> {
    let chunk: GenerateContentChunk = serde_json::from_str(data)
        .map_err(|e| AiError::InvalidResponseFormat(format!("Malformed Gemini chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(AiError::ApiRequestFailed(error.message));
    }

    let mut events = Vec::new();
    for candidate in chunk.candidates {
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if !text.is_empty() {
            events.push(StreamEvent::TextDelta(text));
        }
        if let Some(reason) = candidate.finish_reason {
            events.push(StreamEvent::Finish {
                reason: Some(reason),
            });
        }
    }
    if let Some(usage) = chunk.usage_metadata {
        events.push(StreamEvent::Usage(TokenUsage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        }));
    }
    Ok(events)
}

/// Streaming client for Gemini models.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Creates a client against the public API.
    pub fn new(model: String, api_key: String) -> Result<Self, AiError> {
        Ok(Self {
            client: build_http_client()?,
            api_key,
            model,
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Points the client at another endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request<'a>(
        &'a self,
        request: &'a StructuredRequest,
        system_prompt: &'a str,
    ) -> GenerateContentRequest<'a> {
        let capabilities = get_model_registry().get_capabilities(AiProvider::Google, &self.model);
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_prompt,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.user_prompt,
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: request
                    .structured_outputs
                    .then_some(&request.schema.openapi_schema),
                max_output_tokens: request.max_tokens,
                temperature: capabilities
                    .supports_temperature
                    .then_some(request.temperature),
            },
        }
    }
}

impl AiClient for GeminiClient {
    fn stream_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, AiError>> + Send + 'a>> {
        Box::pin(async move {
            let system_prompt = if request.structured_outputs {
                request.system_prompt.clone()
            } else {
                request.system_prompt_with_schema()
            };
            let body = self.build_request(request, &system_prompt);
            let url = join_url(
                &self.base_url,
                &format!("v1beta/models/{}:streamGenerateContent?alt=sse", self.model),
            );
            debug!(
                model = %self.model,
                max_output_tokens = body.generation_config.max_output_tokens,
                response_schema = body.generation_config.response_schema.is_some(),
                "Built Gemini request payload"
            );
            info!(model = %self.model, "Sending streaming request to Gemini API");

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;
            let response = check_error_response(response).await?;

            let mut data = Box::pin(sse_data(response));
            let events: EventStream = Box::pin(stream! {
                while let Some(item) = data.next().await {
                    match item.and_then(|payload| decode_chunk(&payload)) {
                        Ok(decoded) => {
                            for event in decoded {
                                yield Ok::<StreamEvent, AiError>(event);
                            }
                        }
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
            provider: AiProvider::Google,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}
