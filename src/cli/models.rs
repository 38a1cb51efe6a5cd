//! Model catalog commands.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::ai::model_config::{get_model_registry, ModelRegistry, ModelSpec};
use crate::ai::{AiProvider, ModelSelection};
use crate::config::{ConfigSource, FileConfigSource};

/// Models operations.
#[derive(Parser)]
pub struct ModelsCommand {
    /// Models subcommand to execute.
    #[command(subcommand)]
    pub command: ModelsSubcommands,
}

/// Models subcommands.
#[derive(Subcommand)]
pub enum ModelsSubcommands {
    /// Lists the bundled model catalog with prices.
    List(ListCommand),
    /// Shows the model that `generate` would use.
    Show(ShowCommand),
}

/// List command options.
#[derive(Parser)]
pub struct ListCommand {
    /// Only list models of this provider.
    #[arg(long)]
    pub provider: Option<AiProvider>,
}

/// Show command options.
#[derive(Parser)]
pub struct ShowCommand {}

impl ModelsCommand {
    /// Executes the models command.
    pub fn execute(self, settings_path: &Path) -> Result<()> {
        match self.command {
            ModelsSubcommands::List(cmd) => cmd.execute(settings_path),
            ModelsSubcommands::Show(cmd) => cmd.execute(settings_path),
        }
    }
}

fn price(spec: &ModelSpec) -> String {
    match (spec.input_price, spec.output_price) {
        (Some(input), Some(output)) => format!("${input} / ${output} per 1M tokens"),
        _ => "local".to_string(),
    }
}

/// Renders the catalog, marking `selected` with an asterisk.
fn render_catalog(
    registry: &ModelRegistry,
    provider: Option<AiProvider>,
    selected: Option<&ModelSelection>,
) -> String {
    let mut out = String::new();
    let providers = AiProvider::ALL
        .into_iter()
        .filter(|p| provider.map_or(true, |wanted| wanted == *p));

    for provider in providers {
        let name = registry
            .get_provider_config(provider)
            .map_or(provider.as_str(), |c| c.name.as_str());
        let _ = writeln!(out, "{name} ({provider})");
        for spec in registry.get_models_by_provider(provider) {
            let marker = match selected {
                Some(s) if s.provider == provider && s.model == spec.api_identifier => '*',
                _ => ' ',
            };
            let _ = writeln!(
                out,
                "{marker} {:<28} {:<28} {}",
                spec.api_identifier,
                spec.title,
                price(spec)
            );
        }
        out.push('\n');
    }
    out
}

impl ListCommand {
    /// Executes the list command.
    pub fn execute(self, settings_path: &Path) -> Result<()> {
        let selected = FileConfigSource::new(settings_path)
            .snapshot()
            .ok()
            .map(|s| s.selection);
        print!(
            "{}",
            render_catalog(get_model_registry(), self.provider, selected.as_ref())
        );
        if self.provider.map_or(true, AiProvider::is_local) {
            println!("Any model installed on the Ollama server can be used; see `gitcomai ollama list`.");
        }
        Ok(())
    }
}

impl ShowCommand {
    /// Executes the show command.
    pub fn execute(self, settings_path: &Path) -> Result<()> {
        let snapshot = FileConfigSource::new(settings_path).snapshot()?;
        let selection = snapshot.selection;
        let registry = get_model_registry();

        println!("Provider:    {}", selection.provider);
        println!("Model:       {}", selection.model);
        match registry.get_model_spec(selection.provider, &selection.model) {
            Some(spec) => {
                println!("Title:       {}", spec.title);
                println!("Description: {}", spec.description);
                println!("Pricing:     {}", price(spec));
                println!("Token limit: {}", spec.max_tokens_param.field_name());
                let temperature = if spec.supports_temperature {
                    "supported"
                } else {
                    "not supported"
                };
                println!("Temperature: {temperature}");
            }
            None if selection.provider.is_local() => {
                println!("Endpoint:    {}", snapshot.credentials.ollama_base_url());
            }
            None => println!("Not in the bundled catalog"),
        }
        println!("Max tokens:  {}", snapshot.max_tokens);
        println!("Temperature setting: {}", snapshot.temperature);
        Ok(())
    }
}
