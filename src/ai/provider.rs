//! Provider selection and client resolution.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::ai::anthropic::AnthropicClient;
use crate::ai::error::AiError;
use crate::ai::gemini::GeminiClient;
use crate::ai::model_config::get_model_registry;
use crate::ai::openai::OpenAiCompatibleClient;
use crate::ai::AiClient;

/// Default local Ollama endpoint.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Language model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Chat Completions API.
    OpenAi,
    /// Mistral AI (OpenAI-compatible API).
    Mistral,
    /// Google Gemini API.
    Google,
    /// Local Ollama server.
    Ollama,
}

impl AiProvider {
    /// Every provider, in display order.
    pub const ALL: [AiProvider; 5] = [
        AiProvider::Anthropic,
        AiProvider::OpenAi,
        AiProvider::Mistral,
        AiProvider::Google,
        AiProvider::Ollama,
    ];

    /// Configuration identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AiProvider::Anthropic => "anthropic",
            AiProvider::OpenAi => "openai",
            AiProvider::Mistral => "mistral",
            AiProvider::Google => "google",
            AiProvider::Ollama => "ollama",
        }
    }

    /// Environment variables that supply the API key, in lookup order.
    #[must_use]
    pub fn api_key_env_vars(self) -> &'static [&'static str] {
        match self {
            AiProvider::Anthropic => &["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"],
            AiProvider::OpenAi => &["OPENAI_API_KEY"],
            AiProvider::Mistral => &["MISTRAL_API_KEY"],
            AiProvider::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            AiProvider::Ollama => &[],
        }
    }

    /// Whether the provider runs locally without credentials or metering.
    #[must_use]
    pub fn is_local(self) -> bool {
        matches!(self, AiProvider::Ollama)
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiProvider {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AiProvider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AiError::InvalidConfiguration(format!("Unsupported provider: {s}")))
    }
}

/// A provider and one of its models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    /// Provider.
    pub provider: AiProvider,
    /// Model identifier.
    pub model: String,
}

impl ModelSelection {
    /// Selects the catalog default model of a provider.
    #[must_use]
    pub fn provider_default(provider: AiProvider) -> Self {
        let model = get_model_registry()
            .get_provider_config(provider)
            .map(|c| c.default_model.clone())
            .unwrap_or_default();
        Self { provider, model }
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::provider_default(AiProvider::Anthropic)
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// API keys and endpoint overrides available to the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// API key per hosted provider.
    pub api_keys: HashMap<AiProvider, String>,
    /// Ollama base URL override.
    pub ollama_base_url: Option<String>,
}

impl Credentials {
    /// Returns the non-empty API key of a provider.
    #[must_use]
    pub fn api_key(&self, provider: AiProvider) -> Option<&str> {
        self.api_keys
            .get(&provider)
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }

    /// Sets the API key of a provider.
    #[must_use]
    pub fn with_api_key(mut self, provider: AiProvider, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider, key.into());
        self
    }

    /// Returns the Ollama endpoint in use.
    #[must_use]
    pub fn ollama_base_url(&self) -> &str {
        self.ollama_base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_OLLAMA_BASE_URL)
    }
}

fn require_key(credentials: &Credentials, provider: AiProvider) -> Result<String, AiError> {
    credentials
        .api_key(provider)
        .map(String::from)
        .ok_or(AiError::MissingApiKey {
            provider,
            env_var: provider.api_key_env_vars()[0],
        })
}

/// Builds the client for a selection.
///
/// Hosted providers fail with [`AiError::MissingApiKey`] when no key is
/// configured; the key itself is only validated by the first request.
/// Nothing is sent over the network here.
pub fn resolve(
    selection: &ModelSelection,
    credentials: &Credentials,
) -> Result<Box<dyn AiClient>, AiError> {
    debug!(provider = %selection.provider, model = %selection.model, "Resolving model client");

    if selection.model.trim().is_empty() {
        return Err(AiError::InvalidConfiguration(format!(
            "No model selected for provider {}",
            selection.provider
        )));
    }

    let model = selection.model.clone();
    let client: Box<dyn AiClient> = match selection.provider {
        AiProvider::Anthropic => {
            let key = require_key(credentials, AiProvider::Anthropic)?;
            Box::new(AnthropicClient::new(model, key)?)
        }
        AiProvider::OpenAi => {
            let key = require_key(credentials, AiProvider::OpenAi)?;
            Box::new(OpenAiCompatibleClient::new_openai(model, key)?)
        }
        AiProvider::Mistral => {
            let key = require_key(credentials, AiProvider::Mistral)?;
            Box::new(OpenAiCompatibleClient::new_mistral(model, key)?)
        }
        AiProvider::Google => {
            let key = require_key(credentials, AiProvider::Google)?;
            Box::new(GeminiClient::new(model, key)?)
        }
        AiProvider::Ollama => {
            let base_url = credentials.ollama_base_url();
            Url::parse(base_url).map_err(|e| {
                AiError::InvalidConfiguration(format!("Invalid Ollama base URL '{base_url}': {e}"))
            })?;
            info!(base_url = %base_url, "Using local Ollama server");
            Box::new(OpenAiCompatibleClient::new_ollama(
                model,
                Some(base_url.to_string()),
            )?)
        }
    };

    Ok(client)
}

/// Creates model clients for the generator.
pub trait ClientFactory: Send + Sync {
    /// Builds a client for the selection using the given credentials.
    fn create(
        &self,
        selection: &ModelSelection,
        credentials: &Credentials,
    ) -> Result<Box<dyn AiClient>, AiError>;
}

/// Client factory backed by [`resolve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderResolver;

impl ClientFactory for ProviderResolver {
    fn create(
        &self,
        selection: &ModelSelection,
        credentials: &Credentials,
    ) -> Result<Box<dyn AiClient>, AiError> {
        resolve(selection, credentials)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn select(provider: AiProvider, model: &str) -> ModelSelection {
        ModelSelection {
            provider,
            model: model.to_string(),
        }
    }

    #[test]
    fn provider_round_trips_through_strings() {
        for provider in AiProvider::ALL {
            assert_eq!(provider.as_str().parse::<AiProvider>().unwrap(), provider);
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{provider}\""));
        }
        assert_eq!("OpenAI".parse::<AiProvider>().unwrap(), AiProvider::OpenAi);
        assert!("bedrock".parse::<AiProvider>().is_err());
    }

    #[test]
    fn default_selection() {
        let selection = ModelSelection::default();
        assert_eq!(selection.provider, AiProvider::Anthropic);
        assert_eq!(selection.model, "claude-3-7-sonnet-latest");
        assert_eq!(selection.to_string(), "anthropic/claude-3-7-sonnet-latest");
    }

    #[test]
    fn hosted_providers_require_keys() {
        let credentials = Credentials::default();
        for provider in [
            AiProvider::Anthropic,
            AiProvider::OpenAi,
            AiProvider::Mistral,
            AiProvider::Google,
        ] {
            let err = resolve(&select(provider, "m"), &credentials)
                .err()
                .expect("missing key must fail");
            assert!(
                matches!(err, AiError::MissingApiKey { provider: p, .. } if p == provider),
                "{provider}: {err}"
            );
        }
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let credentials = Credentials::default().with_api_key(AiProvider::OpenAi, "   ");
        assert!(resolve(&select(AiProvider::OpenAi, "gpt-4o"), &credentials).is_err());
    }

    #[test]
    fn resolves_hosted_clients_with_keys() {
        let credentials = Credentials::default()
            .with_api_key(AiProvider::Anthropic, "sk-ant")
            .with_api_key(AiProvider::OpenAi, "sk-openai")
            .with_api_key(AiProvider::Mistral, "mistral-key")
            .with_api_key(AiProvider::Google, "google-key");

        let cases = [
            (AiProvider::Anthropic, "https://api.anthropic.com"),
            (AiProvider::OpenAi, "https://api.openai.com"),
            (AiProvider::Mistral, "https://api.mistral.ai"),
            (AiProvider::Google, "https://generativelanguage.googleapis.com"),
        ];
        for (provider, base_url) in cases {
            let client = resolve(&select(provider, "some-model"), &credentials).unwrap();
            let meta = client.get_metadata();
            assert_eq!(meta.provider, provider);
            assert_eq!(meta.model, "some-model");
            assert_eq!(meta.base_url, base_url);
        }
    }

    #[test]
    fn ollama_needs_no_key_and_defaults_endpoint() {
        let client = resolve(&select(AiProvider::Ollama, "llama3"), &Credentials::default()).unwrap();
        let meta = client.get_metadata();
        assert_eq!(meta.provider, AiProvider::Ollama);
        assert_eq!(meta.base_url, DEFAULT_OLLAMA_BASE_URL);
    }

    #[test]
    fn ollama_honours_base_url_override() {
        let credentials = Credentials {
            ollama_base_url: Some("http://192.168.1.100:11434".to_string()),
            ..Default::default()
        };
        let client = resolve(&select(AiProvider::Ollama, "codellama"), &credentials).unwrap();
        assert_eq!(client.get_metadata().base_url, "http://192.168.1.100:11434");
    }

    #[test]
    fn ollama_rejects_malformed_url() {
        let credentials = Credentials {
            ollama_base_url: Some("not a url".to_string()),
            ..Default::default()
        };
        let err = resolve(&select(AiProvider::Ollama, "llama3"), &credentials)
            .err()
            .unwrap();
        assert!(matches!(err, AiError::InvalidConfiguration(_)));
    }

    #[test]
    fn empty_model_is_rejected() {
        let err = resolve(&select(AiProvider::Ollama, " "), &Credentials::default())
            .err()
            .unwrap();
        assert!(matches!(err, AiError::InvalidConfiguration(_)));
    }
}
