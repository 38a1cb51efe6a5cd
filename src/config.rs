//! User settings and per-call configuration snapshots.
//!
//! Settings are stored in `$HOME/.gitcomai/settings.json`. Environment
//! variables take precedence over the file.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use url::Url;

use crate::ai::model_config::get_model_registry;
use crate::ai::{AiError, AiProvider, Credentials, ModelSelection};

/// Environment variable selecting the provider.
pub const PROVIDER_ENV: &str = "GITCOMAI_PROVIDER";
/// Environment variable selecting the model.
pub const MODEL_ENV: &str = "GITCOMAI_MODEL";
/// Environment variable overriding the Ollama endpoint.
pub const OLLAMA_BASE_URL_ENV: &str = "OLLAMA_BASE_URL";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
/// Default output token limit.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_true() -> bool {
    true
}

/// Settings persisted in `$HOME/.gitcomai/settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Provider and model used for generation.
    #[serde(default)]
    pub selected_model: ModelSelection,
    /// API key per hosted provider.
    #[serde(default)]
    pub api_keys: HashMap<AiProvider, String>,
    /// Ollama endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_base_url: Option<String>,
    /// Sampling temperature, between 0 and 1.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Output token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Ask providers for native strict structured output where available.
    #[serde(default = "default_true")]
    pub structured_outputs: bool,
    /// Verbose logging.
    #[serde(default)]
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_model: ModelSelection::default(),
            api_keys: HashMap::new(),
            ollama_base_url: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            structured_outputs: true,
            debug: false,
        }
    }
}

impl Settings {
    /// Loads settings from the default location.
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::load_from_path(&settings_path)
    }

    /// Loads settings from a specific path, or defaults if it does not exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        serde_json::from_str::<Settings>(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Validates and writes settings to the default location.
    pub fn save(&self) -> Result<()> {
        let settings_path = Self::get_settings_path()?;
        self.save_to_path(&settings_path)
    }

    /// Validates and atomically writes settings to a specific path.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        write_atomically(path, &content)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Returns the default settings path.
    pub fn get_settings_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

        Ok(home_dir.join(".gitcomai").join("settings.json"))
    }

    /// Checks value ranges and that hosted models exist in the catalog.
    pub fn validate(&self) -> Result<()> {
        self.validate_limits()?;

        let selection = &self.selected_model;
        if selection.model.trim().is_empty() {
            bail!("No model selected for provider {}", selection.provider);
        }
        if !selection.provider.is_local()
            && !get_model_registry().is_known_model(selection.provider, &selection.model)
        {
            bail!(
                "Unknown model '{}' for provider {}. Run `gitcomai models list --provider {}`",
                selection.model,
                selection.provider,
                selection.provider
            );
        }

        if let Some(ref base_url) = self.ollama_base_url {
            Url::parse(base_url)
                .with_context(|| format!("Invalid Ollama base URL: {base_url}"))?;
        }
        Ok(())
    }

    /// Checks the generation parameters sent with every request.
    pub fn validate_limits(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            bail!(
                "Temperature must be between 0 and 1, got {}",
                self.temperature
            );
        }
        if self.max_tokens == 0 {
            bail!("Max tokens must be a positive number");
        }
        Ok(())
    }

    /// Resolves the effective configuration, letting `lookup` override the file.
    pub fn snapshot_with<F>(&self, lookup: F) -> Result<ConfigSnapshot, AiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut selection = self.selected_model.clone();
        if let Some(provider) = lookup(PROVIDER_ENV) {
            let provider: AiProvider = provider.parse()?;
            if provider != selection.provider {
                selection = ModelSelection::provider_default(provider);
            }
        }
        if let Some(model) = lookup(MODEL_ENV) {
            selection.model = model;
        }

        let mut credentials = Credentials {
            api_keys: self.api_keys.clone(),
            ollama_base_url: self.ollama_base_url.clone(),
        };
        for provider in AiProvider::ALL {
            if let Some(key) = provider.api_key_env_vars().iter().find_map(|&var| lookup(var)) {
                credentials.api_keys.insert(provider, key);
            }
        }
        if let Some(url) = lookup(OLLAMA_BASE_URL_ENV) {
            credentials.ollama_base_url = Some(url);
        }

        Ok(ConfigSnapshot {
            selection,
            credentials,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            structured_outputs: self.structured_outputs,
            debug: self.debug,
        })
    }

    /// Resolves the effective configuration against the process environment.
    pub fn snapshot(&self) -> Result<ConfigSnapshot, AiError> {
        self.snapshot_with(|key| env::var(key).ok())
    }
}

/// Writes `content` to `path` through a temporary file in the same directory.
pub(crate) fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    file.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Configuration in effect for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// Provider and model.
    pub selection: ModelSelection,
    /// Keys and endpoints.
    pub credentials: Credentials,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token limit.
    pub max_tokens: u32,
    /// Request native strict structured output.
    pub structured_outputs: bool,
    /// Verbose logging.
    pub debug: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            selection: ModelSelection::default(),
            credentials: Credentials::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            structured_outputs: true,
            debug: false,
        }
    }
}

/// Supplies a fresh configuration snapshot at the start of every call.
pub trait ConfigSource: Send + Sync {
    /// Reads the current configuration.
    fn snapshot(&self) -> Result<ConfigSnapshot, AiError>;
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads the settings file and the environment on every call.
#[derive(Clone)]
pub struct FileConfigSource {
    path: PathBuf,
    env: EnvLookup,
}

impl FileConfigSource {
    /// Source backed by a settings file and the process environment.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env: Arc::new(|key| env::var(key).ok()),
        }
    }

    /// Source backed by the default settings file.
    pub fn from_default_path() -> Result<Self> {
        Ok(Self::new(Settings::get_settings_path()?))
    }

    /// Replaces the environment lookup.
    #[must_use]
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ConfigSource for FileConfigSource {
    fn snapshot(&self) -> Result<ConfigSnapshot, AiError> {
        let settings = Settings::load_from_path(&self.path)
            .and_then(|settings| settings.validate_limits().map(|()| settings))
            .map_err(|e| AiError::InvalidConfiguration(format!("{e:#}")))?;
        let env = &self.env;
        settings.snapshot_with(|key| env(key))
    }
}

/// Applies command line overrides on top of another source.
pub struct OverrideConfigSource {
    inner: Arc<dyn ConfigSource>,
    provider: Option<AiProvider>,
    model: Option<String>,
}

impl OverrideConfigSource {
    /// Wraps `inner`; `None` leaves the underlying value in place.
    pub fn new(
        inner: Arc<dyn ConfigSource>,
        provider: Option<AiProvider>,
        model: Option<String>,
    ) -> Self {
        Self {
            inner,
            provider,
            model,
        }
    }
}

impl ConfigSource for OverrideConfigSource {
    fn snapshot(&self) -> Result<ConfigSnapshot, AiError> {
        let mut snapshot = self.inner.snapshot()?;
        if let Some(provider) = self.provider {
            if provider != snapshot.selection.provider {
                snapshot.selection = ModelSelection::provider_default(provider);
            }
        }
        if let Some(ref model) = self.model {
            snapshot.selection.model = model.clone();
        }
        Ok(snapshot)
    }
}
