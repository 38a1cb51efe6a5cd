//! CLI interface for gitcomai.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Settings;

pub mod config;
pub mod generate;
pub mod models;
pub mod ollama;

/// gitcomai: AI commit messages for your staged changes.
#[derive(Parser)]
#[command(name = "gitcomai")]
#[command(about = "Generates gitmoji conventional commit messages with AI", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enables debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Settings file to use instead of ~/.gitcomai/settings.json.
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// The main command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Main command categories.
#[derive(Subcommand)]
pub enum Commands {
    /// Generates a commit message for the staged changes.
    Generate(generate::GenerateCommand),
    /// Model catalog and current selection.
    Models(models::ModelsCommand),
    /// Reads and updates settings.
    Config(config::ConfigCommand),
    /// Manages local Ollama models.
    Ollama(ollama::OllamaCommand),
}

impl Cli {
    /// Resolves the settings file path.
    pub fn settings_path(&self) -> Result<PathBuf> {
        match self.settings {
            Some(ref path) => Ok(path.clone()),
            None => Settings::get_settings_path(),
        }
    }

    /// Whether debug logging was requested on the command line or in settings.
    pub fn debug_enabled(&self) -> bool {
        self.debug
            || self
                .settings_path()
                .and_then(Settings::load_from_path)
                .is_ok_and(|settings| settings.debug)
    }

    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        let settings_path = self.settings_path()?;
        match self.command {
            Commands::Generate(cmd) => cmd.execute(&settings_path).await,
            Commands::Models(cmd) => cmd.execute(&settings_path),
            Commands::Config(cmd) => cmd.execute(&settings_path),
            Commands::Ollama(cmd) => cmd.execute(&settings_path).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "gitcomai",
            "generate",
            "--provider",
            "OpenAI",
            "--model",
            "gpt-4o",
            "--output",
            ".git/COMMIT_EDITMSG",
            "--debug",
        ])
        .unwrap();
        assert!(cli.debug);
        let Commands::Generate(cmd) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(cmd.provider, Some(crate::ai::AiProvider::OpenAi));
        assert_eq!(cmd.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["gitcomai", "generate", "--provider", "bedrock"]).is_err());
    }
}
