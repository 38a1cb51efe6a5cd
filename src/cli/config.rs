//! Configuration-related CLI commands.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::ai::{AiProvider, ModelSelection};
use crate::config::Settings;

/// Configuration operations.
#[derive(Parser)]
pub struct ConfigCommand {
    /// Configuration subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Shows the settings with API keys masked.
    Show(ShowCommand),
    /// Selects the provider and model used for generation.
    SetModel(SetModelCommand),
    /// Stores the API key of a hosted provider.
    SetKey(SetKeyCommand),
    /// Changes a generation setting.
    Set(SetCommand),
}

/// Show command options.
#[derive(Parser)]
pub struct ShowCommand {}

/// Set-model command options.
#[derive(Parser)]
pub struct SetModelCommand {
    /// Provider (anthropic, openai, mistral, google, ollama).
    pub provider: AiProvider,
    /// Model identifier; defaults to the provider's default model.
    pub model: Option<String>,
}

/// Set-key command options.
#[derive(Parser)]
pub struct SetKeyCommand {
    /// Hosted provider.
    pub provider: AiProvider,
    /// API key; an empty value removes the stored key.
    pub key: String,
}

/// Settings that `config set` can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SettingKey {
    /// Sampling temperature, between 0 and 1.
    Temperature,
    /// Output token limit.
    MaxTokens,
    /// Ollama endpoint.
    OllamaUrl,
    /// Verbose logging (true/false).
    Debug,
    /// Native strict structured output (true/false).
    StructuredOutputs,
}

/// Set command options.
#[derive(Parser)]
pub struct SetCommand {
    /// Setting to change.
    #[arg(value_enum)]
    pub key: SettingKey,
    /// New value.
    pub value: String,
}

impl ConfigCommand {
    /// Executes the config command.
    pub fn execute(self, settings_path: &Path) -> Result<()> {
        match self.command {
            ConfigSubcommands::Show(cmd) => cmd.execute(settings_path),
            ConfigSubcommands::SetModel(cmd) => cmd.execute(settings_path),
            ConfigSubcommands::SetKey(cmd) => cmd.execute(settings_path),
            ConfigSubcommands::Set(cmd) => cmd.execute(settings_path),
        }
    }
}

/// Keeps the first and last four characters of a key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsView<'a> {
    settings_file: String,
    selected_model: &'a ModelSelection,
    api_keys: BTreeMap<AiProvider, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ollama_base_url: Option<&'a str>,
    temperature: f32,
    max_tokens: u32,
    structured_outputs: bool,
    debug: bool,
}

fn render_settings(settings: &Settings, path: &Path) -> Result<String> {
    let view = SettingsView {
        settings_file: path.display().to_string(),
        selected_model: &settings.selected_model,
        api_keys: settings
            .api_keys
            .iter()
            .map(|(provider, key)| (*provider, mask_key(key)))
            .collect(),
        ollama_base_url: settings.ollama_base_url.as_deref(),
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        structured_outputs: settings.structured_outputs,
        debug: settings.debug,
    };
    serde_yaml::to_string(&view).context("Failed to render settings")
}

impl ShowCommand {
    /// Executes the show command.
    pub fn execute(self, settings_path: &Path) -> Result<()> {
        let settings = Settings::load_from_path(settings_path)?;
        print!("{}", render_settings(&settings, settings_path)?);
        Ok(())
    }
}

impl SetModelCommand {
    /// Applies the selection to `settings`.
    fn apply(self, settings: &mut Settings) {
        settings.selected_model = match self.model {
            Some(model) => ModelSelection {
                provider: self.provider,
                model,
            },
            None => ModelSelection::provider_default(self.provider),
        };
    }

    /// Executes the set-model command.
    pub fn execute(self, settings_path: &Path) -> Result<()> {
        let mut settings = Settings::load_from_path(settings_path)?;
        self.apply(&mut settings);
        settings.save_to_path(settings_path)?;
        eprintln!("Selected {}", settings.selected_model);
        Ok(())
    }
}

impl SetKeyCommand {
    fn apply(self, settings: &mut Settings) -> Result<()> {
        if self.provider.is_local() {
            bail!("{} does not use an API key", self.provider);
        }
        let key = self.key.trim();
        if key.is_empty() {
            settings.api_keys.remove(&self.provider);
        } else {
            settings.api_keys.insert(self.provider, key.to_string());
        }
        Ok(())
    }

    /// Executes the set-key command.
    pub fn execute(self, settings_path: &Path) -> Result<()> {
        let provider = self.provider;
        let mut settings = Settings::load_from_path(settings_path)?;
        self.apply(&mut settings)?;
        settings.save_to_path(settings_path)?;
        match settings.api_keys.get(&provider) {
            Some(key) => eprintln!("Stored API key for {provider} ({})", mask_key(key)),
            None => eprintln!("Removed API key for {provider}"),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => bail!("Expected true or false, got '{other}'"),
    }
}

impl SetCommand {
    fn apply(&self, settings: &mut Settings) -> Result<()> {
        let value = self.value.trim();
        match self.key {
            SettingKey::Temperature => {
                settings.temperature = value
                    .parse()
                    .with_context(|| format!("Invalid temperature: {value}"))?;
            }
            SettingKey::MaxTokens => {
                settings.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max tokens: {value}"))?;
            }
            SettingKey::OllamaUrl => {
                settings.ollama_base_url = (!value.is_empty()).then(|| value.to_string());
            }
            SettingKey::Debug => settings.debug = parse_bool(value)?,
            SettingKey::StructuredOutputs => settings.structured_outputs = parse_bool(value)?,
        }
        Ok(())
    }

    /// Executes the set command.
    pub fn execute(self, settings_path: &Path) -> Result<()> {
        let mut settings = Settings::load_from_path(settings_path)?;
        self.apply(&mut settings)?;
        settings.save_to_path(settings_path)?;
        if let Some(name) = self.key.to_possible_value() {
            eprintln!("Updated {}", name.get_name());
        }
        Ok(())
    }
}
