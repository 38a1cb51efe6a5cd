//! Local Ollama model commands.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::ai::{AiProvider, ModelSelection};
use crate::config::{ConfigSource, FileConfigSource, Settings};
use crate::ollama::{format_size, OllamaClient, OllamaModel};
use crate::ui::TerminalProgress;

/// Ollama operations.
#[derive(Parser)]
pub struct OllamaCommand {
    /// Ollama subcommand to execute.
    #[command(subcommand)]
    pub command: OllamaSubcommands,
}

/// Ollama subcommands.
#[derive(Subcommand)]
pub enum OllamaSubcommands {
    /// Lists the models installed on the Ollama server.
    List(ListCommand),
    /// Downloads a model to the Ollama server.
    Pull(PullCommand),
}

/// List command options.
#[derive(Parser)]
pub struct ListCommand {}

/// Pull command options.
#[derive(Parser)]
pub struct PullCommand {
    /// Model name, optionally with a tag (e.g. `llama3:8b`).
    pub model: String,

    /// Selects the model for generation once downloaded.
    #[arg(long = "use")]
    pub select: bool,
}

impl OllamaCommand {
    /// Executes the ollama command.
    pub async fn execute(self, settings_path: &Path) -> Result<()> {
        let base_url = FileConfigSource::new(settings_path)
            .snapshot()?
            .credentials
            .ollama_base_url()
            .to_string();
        let client = OllamaClient::new(base_url)?;
        match self.command {
            OllamaSubcommands::List(cmd) => cmd.execute(&client).await,
            OllamaSubcommands::Pull(cmd) => cmd.execute(&client, settings_path).await,
        }
    }
}

fn render_models(models: &[OllamaModel]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<32} {:>10} {:>8} {:<8}", "NAME", "SIZE", "PARAMS", "QUANT");
    for model in models {
        let _ = writeln!(
            out,
            "{:<32} {:>10} {:>8} {:<8}",
            model.name,
            format_size(model.size),
            model.details.parameter_size,
            model.details.quantization_level
        );
    }
    out
}

impl ListCommand {
    /// Executes the list command.
    pub async fn execute(self, client: &OllamaClient) -> Result<()> {
        let models = client.list_models().await?;
        if models.is_empty() {
            eprintln!("No models installed. Pull one with `gitcomai ollama pull <MODEL>`");
            return Ok(());
        }
        print!("{}", render_models(&models));
        Ok(())
    }
}

impl PullCommand {
    /// Executes the pull command.
    pub async fn execute(self, client: &OllamaClient, settings_path: &Path) -> Result<()> {
        let progress = TerminalProgress::live();
        let pulled = client.pull_model(&self.model, &progress).await;
        progress.finish();
        pulled?;
        eprintln!("Pulled {}", self.model);

        if self.select {
            let mut settings = Settings::load_from_path(settings_path)?;
            settings.selected_model = ModelSelection {
                provider: AiProvider::Ollama,
                model: self.model,
            };
            settings.save_to_path(settings_path)?;
            eprintln!("Selected {}", settings.selected_model);
        }
        Ok(())
    }
}
