//! Local Ollama model management.

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::generator::ProgressSink;
use crate::ai::{build_http_client, check_error_response, join_url, AiError};

/// Details of a local model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OllamaModelDetails {
    /// Weight format (gguf, ...).
    pub format: String,
    /// Model family.
    pub family: String,
    /// Parameter count, e.g. `8.0B`.
    pub parameter_size: String,
    /// Quantization, e.g. `Q4_0`.
    pub quantization_level: String,
}

/// A model available on the Ollama server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OllamaModel {
    /// Model name with tag.
    pub name: String,
    /// Last modification time as reported by the server.
    #[serde(default)]
    pub modified_at: String,
    /// Size on disk in bytes.
    #[serde(default)]
    pub size: u64,
    /// Content digest.
    #[serde(default)]
    pub digest: String,
    /// Model details.
    #[serde(default)]
    pub details: OllamaModelDetails,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

impl PullProgress {
    /// Percentage and status line for a progress update.
    fn describe(&self) -> (Option<f64>, String) {
        match (self.completed, self.total) {
            (Some(completed), Some(total)) if completed > 0 && total > 0 => {
                let percent = completed as f64 / total as f64 * 100.0;
                let message = format!(
                    "{} - {} / {} ({:.1}%)",
                    self.status,
                    format_size(completed),
                    format_size(total),
                    percent
                );
                (Some(percent), message)
            }
            _ => (None, self.status.clone()),
        }
    }
}

/// Renders a byte count as B, KB, MB or GB with one decimal.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{:.1} KB", b as f64 / KB as f64),
        b if b < GB => format!("{:.1} MB", b as f64 / MB as f64),
        b => format!("{:.1} GB", b as f64 / GB as f64),
    }
}

/// Client for the Ollama management API.
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Creates a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, AiError> {
        Ok(Self {
            client: build_http_client()?,
            base_url: base_url.into(),
        })
    }

    /// Lists the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, AiError> {
        let url = join_url(&self.base_url, "api/tags");
        debug!(url = %url, "Fetching Ollama models");
        let response = check_error_response(self.client.get(&url).send().await?).await?;
        let tags: TagsResponse = response.json().await.map_err(|e| {
            AiError::InvalidResponseFormat(format!("Invalid response format from Ollama API: {e}"))
        })?;
        Ok(tags.models)
    }

    /// Downloads a model, reporting progress as it streams in.
    ///
    /// Progress increments add up to the overall percentage of each layer
    /// being downloaded; status-only updates carry no increment.
    pub async fn pull_model(&self, model: &str, progress: &dyn ProgressSink) -> Result<(), AiError> {
        let url = join_url(&self.base_url, "api/pull");
        info!(model = %model, url = %url, "Pulling Ollama model");
        let response = self
            .client
            .post(&url)
            .json(&PullRequest {
                model,
                stream: true,
            })
            .send()
            .await?;
        let response = check_error_response(response).await?;

        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut reported = 0.0_f64;

        let mut handle_line = |line: &[u8]| -> Result<(), AiError> {
            let line = String::from_utf8_lossy(line);
            let line = line.trim();
            if line.is_empty() {
                return Ok(());
            }
            let update: PullProgress = serde_json::from_str(line).map_err(|e| {
                AiError::InvalidResponseFormat(format!("Malformed pull progress: {e}"))
            })?;
            if let Some(error) = update.error {
                return Err(AiError::ApiRequestFailed(error));
            }
            let (percent, message) = update.describe();
            // A new layer restarts at zero.
            let increment = percent.map(|p| {
                if p < reported {
                    reported = 0.0;
                }
                let step = p - reported;
                reported = p;
                step
            });
            progress.report(Some(&message), increment);
            Ok(())
        };

        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                handle_line(&line)?;
            }
        }
        handle_line(&buffer)?;

        info!(model = %model, "Pulled Ollama model");
        Ok(())
    }
}
