//! Commit message generation command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ai::{AiProvider, CommitGenerator, Notifier};
use crate::config::{ConfigSource, FileConfigSource, OverrideConfigSource};
use crate::git::GitRepository;
use crate::ui::{ConsoleNotifier, FileCommitInput, LiveCommitInput, TerminalProgress};

/// Generates a commit message for the staged changes.
#[derive(Parser)]
pub struct GenerateCommand {
    /// Repository to read staged changes from.
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub repo: PathBuf,

    /// Writes the message to this file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Provider to use for this run (anthropic, openai, mistral, google, ollama).
    #[arg(long)]
    pub provider: Option<AiProvider>,

    /// Model to use for this run.
    #[arg(long)]
    pub model: Option<String>,
}

impl GenerateCommand {
    /// Executes the generate command.
    pub async fn execute(self, settings_path: &Path) -> Result<()> {
        let notifier = ConsoleNotifier::new();
        let repo = GitRepository::open_at(&self.repo)?;
        let Some(diff) = repo.staged_diff()? else {
            notifier.info("No changes detected");
            return Ok(());
        };
        let files = repo.staged_files()?;
        debug!(files = ?files, "Staged files");

        let source: Arc<dyn ConfigSource> = Arc::new(OverrideConfigSource::new(
            Arc::new(FileConfigSource::new(settings_path)),
            self.provider,
            self.model,
        ));
        precheck(source.as_ref(), &notifier);

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let generator = CommitGenerator::new(source);
        let progress = TerminalProgress::deferred();
        let message = match self.output {
            Some(ref path) => {
                let input = FileCommitInput::new(path);
                generator
                    .generate(&diff, &files, &progress, &input, &notifier, &cancel)
                    .await
            }
            None => {
                let input = LiveCommitInput::new();
                let message = generator
                    .generate(&diff, &files, &progress, &input, &notifier, &cancel)
                    .await;
                input.clear();
                message
            }
        };
        ctrl_c.abort();

        match message {
            Some(message) => {
                progress.finish();
                match self.output {
                    Some(path) => eprintln!("Wrote commit message to {}", path.display()),
                    None => println!("{message}"),
                }
                Ok(())
            }
            None if cancel.is_cancelled() => {
                eprintln!("Cancelled");
                Ok(())
            }
            None => bail!("No commit message was generated"),
        }
    }
}

/// Tells the user about missing keys and the local endpoint before any request.
///
/// Configuration errors are left for the generator to report.
fn precheck(source: &dyn ConfigSource, notifier: &dyn Notifier) {
    let Ok(snapshot) = source.snapshot() else {
        return;
    };
    let provider = snapshot.selection.provider;
    if provider.is_local() {
        notifier.info(&format!(
            "Using Ollama at {} with model {}",
            snapshot.credentials.ollama_base_url(),
            snapshot.selection.model
        ));
    } else if snapshot.credentials.api_key(provider).is_none() {
        notifier.warn(&format!(
            "No API key configured for {provider}. Set {} or run `gitcomai config set-key {provider} <KEY>`",
            provider.api_key_env_vars().join(" or ")
        ));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ai::test_utils::{FixtureConfig, Recorded, Recorder};
    use crate::ai::{Credentials, ModelSelection};
    use crate::config::ConfigSnapshot;

    fn snapshot(provider: AiProvider, model: &str, credentials: Credentials) -> ConfigSnapshot {
        ConfigSnapshot {
            selection: ModelSelection {
                provider,
                model: model.to_string(),
            },
            credentials,
            ..ConfigSnapshot::default()
        }
    }

    #[test]
    fn missing_key_warns() {
        let config = FixtureConfig::new(snapshot(
            AiProvider::Mistral,
            "mistral-small-latest",
            Credentials::default(),
        ));
        let recorder = Recorder::default();
        precheck(&config, &recorder);
        assert_eq!(
            recorder.log(),
            vec![Recorded::Warn(
                "No API key configured for mistral. Set MISTRAL_API_KEY or run `gitcomai config set-key mistral <KEY>`"
                    .into()
            )]
        );
    }

    #[test]
    fn configured_key_is_silent() {
        let credentials = Credentials::default().with_api_key(AiProvider::OpenAi, "sk-test");
        let config = FixtureConfig::new(snapshot(AiProvider::OpenAi, "gpt-4o", credentials));
        let recorder = Recorder::default();
        precheck(&config, &recorder);
        assert!(recorder.log().is_empty());
    }

    #[test]
    fn ollama_reports_endpoint() {
        let config = FixtureConfig::new(snapshot(
            AiProvider::Ollama,
            "llama3",
            Credentials::default(),
        ));
        let recorder = Recorder::default();
        precheck(&config, &recorder);
        assert_eq!(
            recorder.log(),
            vec![Recorded::Info(
                "Using Ollama at http://localhost:11434 with model llama3".into()
            )]
        );
    }

    #[test]
    fn broken_config_is_left_to_the_generator() {
        let config = FixtureConfig::broken("bad settings");
        let recorder = Recorder::default();
        precheck(&config, &recorder);
        assert!(recorder.log().is_empty());
    }
}
