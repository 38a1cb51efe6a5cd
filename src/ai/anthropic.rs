//! Anthropic Messages API client.
//!
//! Structured output is obtained by forcing a single tool call whose input
//! schema is the commit message schema; the tool input then streams as
//! `input_json_delta` fragments.

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

/// Anthropic API base URL.
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize, Debug)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct Tool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Serialize, Debug)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    choice_type: &'static str,
    name: &'a str,
}

#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice<'a>>,
    stream: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        TokenUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

#[derive(Deserialize, Debug)]
struct MessageStart {
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    InputJsonDelta { partial_json: String },
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Default)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Server-sent event payloads of a streaming Messages response.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagesEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockDelta {
        delta: ContentDelta,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Usage,
    },
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Other,
}

/// Translates one SSE payload into stream events.
fn decode_event(data: &str) -> Result<Vec<StreamEvent>, AiError> {
    let event: MessagesEvent = serde_json::from_str(data).map_err(|e| {
        AiError::InvalidResponseFormat(format!("Malformed Anthropic stream event: {e}"))
    })?;

    let events = match event {
        MessagesEvent::MessageStart { message } => vec![StreamEvent::Usage(message.usage.into())],
        MessagesEvent::ContentBlockDelta { delta } => match delta {
            ContentDelta::InputJsonDelta { partial_json } if !partial_json.is_empty() => {
                vec![StreamEvent::TextDelta(partial_json)]
            }
            ContentDelta::TextDelta { text } if !text.is_empty() => {
                vec![StreamEvent::TextDelta(text)]
            }
            _ => Vec::new(),
        },
        MessagesEvent::MessageDelta { delta, usage } => vec![
            StreamEvent::Usage(usage.into()),
            StreamEvent::Finish {
                reason: delta.stop_reason,
            },
        ],
        MessagesEvent::Error { error } => {
            return Err(AiError::ApiRequestFailed(format!(
                "{}: {}",
                error.error_type, error.message
            )))
        }
        MessagesEvent::Other => Vec::new(),
    };
    Ok(events)
}

/// Streaming client for Anthropic models.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    /// Creates a client against the public API.
    pub fn new(model: String, api_key: String) -> Result<Self, AiError> {
        Ok(Self {
            client: build_http_client()?,
            api_key,
            model,
            base_url: ANTHROPIC_API_BASE.to_string(),
        })
    }

    /// Points the client at another endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request<'a>(&'a self, request: &'a StructuredRequest) -> MessagesRequest<'a> {
        let capabilities = get_model_registry().get_capabilities(AiProvider::Anthropic, &self.model);
        let temperature = capabilities
            .supports_temperature
            .then_some(request.temperature);

        let (system, tools, tool_choice) = if request.structured_outputs {
            (
                request.system_prompt.clone(),
                vec![Tool {
                    name: &request.schema.name,
                    description: &request.schema.description,
                    input_schema: &request.schema.json_schema,
                }],
                Some(ToolChoice {
                    choice_type: "tool",
                    name: &request.schema.name,
                }),
            )
        } else {
            (request.system_prompt_with_schema(), Vec::new(), None)
        };

        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: &request.user_prompt,
            }],
            temperature,
            tools,
            tool_choice,
            stream: true,
        }
    }
}

impl AiClient for AnthropicClient {
    fn stream_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, AiError>> + Send + 'a>> {
        Box::pin(async move {
            let body = self.build_request(request);
            let url = join_url(&self.base_url, "v1/messages");
            debug!(
                model = %self.model,
                max_tokens = body.max_tokens,
                tool_forced = body.tool_choice.is_some(),
                "Built Anthropic request payload"
            );
            info!(url = %url, model = %self.model, "Sending streaming request to Anthropic API");

            let response = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("accept", "text/event-stream")
                .json(&body)
                .send()
                .await?;
            let response = check_error_response(response).await?;

            let mut data = Box::pin(sse_data(response));
            let events: EventStream = Box::pin(stream! {
                while let Some(item) = data.next().await {
                    match item.and_then(|payload| decode_event(&payload)) {
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
            provider: AiProvider::Anthropic,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ai::schema::commit_output_schema;
    use crate::ai::test_utils::{collect_events, sse_body};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(structured_outputs: bool) -> StructuredRequest {
        StructuredRequest {
            system_prompt: "You write commit messages.".to_string(),
            user_prompt: "Git diff: ...".to_string(),
            schema: commit_output_schema(),
            temperature: 0.2,
            max_tokens: 1024,
            structured_outputs,
        }
    }

    #[test]
    fn tool_is_forced_for_structured_output() {
        let client = AnthropicClient::new("claude-3-7-sonnet-latest".into(), "k".into()).unwrap();
        let req = request(true);
        let body = serde_json::to_value(client.build_request(&req)).unwrap();
        assert_eq!(body["tool_choice"], json!({"type": "tool", "name": "commit_message"}));
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["system"], "You write commit messages.");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn json_mode_embeds_schema_in_system_prompt() {
        let client = AnthropicClient::new("claude-3-5-haiku-latest".into(), "k".into()).unwrap();
        let req = request(false);
        let body = serde_json::to_value(client.build_request(&req)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body["system"].as_str().unwrap().contains("JSON Schema"));
    }

    #[test]
    fn decodes_stream_payloads() {
        let events = decode_event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"emoji\":"}}"#,
        )
        .unwrap();
        assert_eq!(events, vec![StreamEvent::TextDelta("{\"emoji\":".into())]);

        let events = decode_event(
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":42}}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::Usage(TokenUsage {
                    input_tokens: 0,
                    output_tokens: 42
                }),
                StreamEvent::Finish {
                    reason: Some("tool_use".into())
                }
            ]
        );

        assert!(decode_event(r#"{"type":"ping"}"#).unwrap().is_empty());
        assert!(decode_event(r#"{"type":"content_block_start","index":0}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn error_event_fails_the_stream() {
        let err = decode_event(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AiError::ApiRequestFailed(ref m) if m.contains("Overloaded")));
        assert!(decode_event("not json").is_err());
    }

    #[tokio::test]
    async fn streams_tool_input_from_server() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":120,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t","name":"commit_message","input":{}}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"emoji\":\"✨\","}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"type\":\"feat\"}"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":30}}"#,
            r#"{"type":"message_stop"}"#,
        ]);

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"stream": true, "model": "claude-3-7-sonnet-latest"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = AnthropicClient::new("claude-3-7-sonnet-latest".into(), "sk-ant-test".into())
            .unwrap()
            .with_base_url(server.uri());
        let req = request(true);
        let (text, usage, finish) = collect_events(client.stream_structured(&req).await.unwrap())
            .await
            .unwrap();

        assert_eq!(text, r#"{"emoji":"✨","type":"feat"}"#);
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 30);
        assert_eq!(finish.as_deref(), Some("tool_use"));
    }

    #[tokio::test]
    async fn http_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
            ))
            .mount(&server)
            .await;

        let client = AnthropicClient::new("claude-3-7-sonnet-latest".into(), "bad".into())
            .unwrap()
            .with_base_url(server.uri());
        let req = request(true);
        let err = client.stream_structured(&req).await.err().unwrap();
        assert!(matches!(err, AiError::ApiRequestFailed(ref m) if m.contains("401")));
    }
}
