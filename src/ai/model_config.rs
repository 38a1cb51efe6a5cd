//! Model catalog and pricing table.
//!
//! The catalog is loaded from an embedded YAML template so the pricing
//! table and per-model request capabilities ship with the binary.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::ai::provider::AiProvider;

/// Embedded model catalog.
pub const MODELS_YAML: &str = include_str!("../templates/models.yaml");

/// Request field used to cap the number of generated tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxTokensParam {
    /// Legacy `max_tokens` field.
    #[default]
    MaxTokens,
    /// `max_completion_tokens`, required by reasoning models.
    MaxCompletionTokens,
}

impl MaxTokensParam {
    /// Returns the JSON field name.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            MaxTokensParam::MaxTokens => "max_tokens",
            MaxTokensParam::MaxCompletionTokens => "max_completion_tokens",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Catalog entry for one model.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelSpec {
    /// Provider offering the model.
    pub provider: AiProvider,
    /// Identifier sent in API requests (e.g., "gpt-4o-mini").
    pub api_identifier: String,
    /// Human-readable name.
    pub title: String,
    /// Short description shown in listings.
    pub description: String,
    /// USD per million input tokens; absent for unmetered local models.
    #[serde(default)]
    pub input_price: Option<f64>,
    /// USD per million output tokens; absent for unmetered local models.
    #[serde(default)]
    pub output_price: Option<f64>,
    /// Request field naming the output limit.
    #[serde(default)]
    pub max_tokens_param: MaxTokensParam,
    /// Whether the model accepts a sampling temperature.
    #[serde(default = "default_true")]
    pub supports_temperature: bool,
}

/// Per-provider settings from the catalog.
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// Human-readable provider name.
    pub name: String,
    /// Base URL for API requests.
    pub api_base: String,
    /// Model used when none is configured.
    pub default_model: String,
}

/// Complete catalog document.
#[derive(Debug, Deserialize)]
pub struct ModelConfiguration {
    /// All catalog models.
    pub models: Vec<ModelSpec>,
    /// Provider sections.
    pub providers: HashMap<AiProvider, ProviderConfig>,
}

/// Input/output prices for a metered model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    /// USD per million input tokens.
    pub input_per_million: f64,
    /// USD per million output tokens.
    pub output_per_million: f64,
}

/// Request-shaping capabilities of a (provider, model) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Field used for the output limit.
    pub max_tokens_param: MaxTokensParam,
    /// Whether to send a temperature.
    pub supports_temperature: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            max_tokens_param: MaxTokensParam::MaxTokens,
            supports_temperature: true,
        }
    }
}

/// Model registry for looking up specifications.
pub struct ModelRegistry {
    config: ModelConfiguration,
    by_key: HashMap<(AiProvider, String), ModelSpec>,
}

impl ModelRegistry {
    /// Loads the registry from the embedded YAML.
    pub fn load() -> Result<Self> {
        Self::from_yaml(MODELS_YAML)
    }

    /// Loads a registry from YAML text.
    pub fn from_yaml(yaml_content: &str) -> Result<Self> {
        let config: ModelConfiguration = serde_yaml::from_str(yaml_content)?;

        let by_key = config
            .models
            .iter()
            .map(|m| ((m.provider, m.api_identifier.clone()), m.clone()))
            .collect();

        Ok(Self { config, by_key })
    }

    /// Returns the catalog entry for a model.
    pub fn get_model_spec(&self, provider: AiProvider, api_identifier: &str) -> Option<&ModelSpec> {
        self.by_key.get(&(provider, api_identifier.to_string()))
    }

    /// Returns true if the model is in the provider's catalog.
    pub fn is_known_model(&self, provider: AiProvider, api_identifier: &str) -> bool {
        self.get_model_spec(provider, api_identifier).is_some()
    }

    /// Returns pricing for a metered model, `None` when unknown or unpriced.
    pub fn get_pricing(&self, provider: AiProvider, api_identifier: &str) -> Option<Pricing> {
        let spec = self.get_model_spec(provider, api_identifier)?;
        Some(Pricing {
            input_per_million: spec.input_price?,
            output_per_million: spec.output_price?,
        })
    }

    /// Returns request capabilities, defaulting for models not in the catalog.
    pub fn get_capabilities(&self, provider: AiProvider, api_identifier: &str) -> ModelCapabilities {
        self.get_model_spec(provider, api_identifier)
            .map(|spec| ModelCapabilities {
                max_tokens_param: spec.max_tokens_param,
                supports_temperature: spec.supports_temperature,
            })
            .unwrap_or_default()
    }

    /// Returns the catalog models of one provider, in catalog order.
    pub fn get_models_by_provider(&self, provider: AiProvider) -> Vec<&ModelSpec> {
        self.config
            .models
            .iter()
            .filter(|m| m.provider == provider)
            .collect()
    }

    /// Returns a provider section.
    pub fn get_provider_config(&self, provider: AiProvider) -> Option<&ProviderConfig> {
        self.config.providers.get(&provider)
    }
}

/// Global model registry instance.
static MODEL_REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

/// Returns the global model registry instance.
pub fn get_model_registry() -> &'static ModelRegistry {
    MODEL_REGISTRY.get_or_init(|| ModelRegistry::load().expect("Failed to load model registry"))
}
