//! Streaming commit message generation.
//!
//! [`CommitGenerator::stream`] turns one structured-output request into an
//! async stream of [`GenerationEvent`]s: a `Partial` every time the message
//! known so far changes, then a single `Completed`. [`CommitGenerator::generate`]
//! drives that stream against a cancellation token and reports to the
//! progress sink, the commit input and the notifier.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ai::cost::calculate_cost;
use crate::ai::format::format_partial;
use crate::ai::partial_json::{closed_document, parse_partial_json};
use crate::ai::provider::{ClientFactory, ModelSelection, ProviderResolver};
use crate::ai::schema::{commit_output_schema, CommitMessage, PartialCommitMessage};
use crate::ai::{AiError, StreamEvent, StructuredRequest, TokenUsage};
use crate::config::ConfigSource;
use crate::prompts::{CommitPromptBuilder, PromptBuilder};

/// Progress increment reported with every partial message.
pub const PARTIAL_PROGRESS_STEP: f64 = 1.0;

/// Receives status text and progress increments (in percent).
pub trait ProgressSink: Send + Sync {
    /// Reports progress; either part may be absent.
    fn report(&self, message: Option<&str>, increment: Option<f64>);
}

/// The text field holding the pending commit message.
pub trait CommitInput: Send + Sync {
    /// Replaces the field's content.
    fn set_value(&self, value: &str);
}

/// User-facing notifications.
pub trait Notifier: Send + Sync {
    /// Informational message.
    fn info(&self, message: &str);
    /// Warning.
    fn warn(&self, message: &str);
    /// Error.
    fn error(&self, message: &str);
}

/// Terminal state of a generation stream.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// The final message, if the model produced a complete one.
    pub message: Option<CommitMessage>,
    /// Token usage, if the provider reported any.
    pub usage: Option<TokenUsage>,
    /// Model that produced the message.
    pub selection: ModelSelection,
    /// Provider finish reason.
    pub finish_reason: Option<String>,
}

/// Event produced while generating.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// The merged message changed.
    Partial {
        /// Merged message so far.
        message: PartialCommitMessage,
        /// `message` rendered as commit text.
        text: String,
    },
    /// The provider finished.
    Completed(GenerationOutcome),
}

/// Boxed stream of generation events.
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationEvent, AiError>> + Send>>;

/// Picks the authoritative final message: the complete object parsed from the
/// full response text, falling back to the merged partials.
fn reconcile(text: &str, accumulator: PartialCommitMessage) -> Option<CommitMessage> {
    let parsed = closed_document(text)
        .and_then(|doc| serde_json::from_str::<CommitMessage>(doc).ok())
        .map(|mut message| {
            message.scope = message.scope.filter(|s| !s.is_empty());
            message
        })
        .filter(|m| !m.emoji.is_empty() && !m.commit_type.is_empty() && !m.description.is_empty());

    match parsed {
        Some(message) => Some(message),
        None => {
            debug!("Final object missing or incomplete, using merged partial message");
            accumulator.into_complete()
        }
    }
}

/// Generates commit messages with the configured model.
///
/// Holds no state between calls: configuration is read from the
/// [`ConfigSource`] and a client is built at the start of every call.
pub struct CommitGenerator {
    config: Arc<dyn ConfigSource>,
    clients: Arc<dyn ClientFactory>,
    prompts: Arc<dyn PromptBuilder>,
}

impl CommitGenerator {
    /// Creates a generator using the provider resolver and the default prompts.
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self {
            config,
            clients: Arc::new(ProviderResolver),
            prompts: Arc::new(CommitPromptBuilder),
        }
    }

    /// Replaces the client factory.
    #[must_use]
    pub fn with_client_factory(mut self, clients: Arc<dyn ClientFactory>) -> Self {
        self.clients = clients;
        self
    }

    /// Opens a generation as a stream of events.
    ///
    /// Nothing happens until the stream is polled. Configuration and client
    /// errors are yielded as the first item; dropping the stream aborts the
    /// provider request.
    pub fn stream(&self, diff: &str, files: &[String]) -> GenerationStream {
        let config = Arc::clone(&self.config);
        let clients = Arc::clone(&self.clients);
        let prompts = Arc::clone(&self.prompts);
        let diff = diff.to_string();
        let files = files.to_vec();

        Box::pin(stream! {
            let snapshot = match config.snapshot() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    yield Err::<GenerationEvent, AiError>(e);
                    return;
                }
            };
            let selection = snapshot.selection.clone();

            let client = match clients.create(&selection, &snapshot.credentials) {
                Ok(client) => client,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let built = prompts.build(&diff, &files);
            let request = StructuredRequest {
                system_prompt: built.system,
                user_prompt: built.user,
                schema: commit_output_schema(),
                temperature: snapshot.temperature,
                max_tokens: snapshot.max_tokens,
                structured_outputs: snapshot.structured_outputs,
            };
            info!(
                provider = %selection.provider,
                model = %selection.model,
                files = files.len(),
                diff_len = diff.len(),
                "Generating commit message"
            );

            let mut events = match client.stream_structured(&request).await {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut text = String::new();
            let mut accumulator = PartialCommitMessage::default();
            let mut usage: Option<TokenUsage> = None;
            let mut finish_reason = None;

            while let Some(event) = events.next().await {
                match event {
                    Ok(StreamEvent::TextDelta(delta)) => {
                        text.push_str(&delta);
                        let Some(chunk) = parse_partial_json(&text)
                            .as_ref()
                            .and_then(PartialCommitMessage::from_value)
                        else {
                            continue;
                        };
                        let previous = accumulator.clone();
                        accumulator.merge(chunk);
                        if accumulator != previous {
                            yield Ok(GenerationEvent::Partial {
                                text: format_partial(&accumulator),
                                message: accumulator.clone(),
                            });
                        }
                    }
                    Ok(StreamEvent::Usage(reported)) => {
                        usage.get_or_insert_with(TokenUsage::default).merge(reported);
                    }
                    Ok(StreamEvent::Finish { reason }) => {
                        debug!(reason = ?reason, "Provider finished");
                        finish_reason = reason.or(finish_reason);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            debug!(response_len = text.len(), usage = ?usage, "Stream complete");
            yield Ok(GenerationEvent::Completed(GenerationOutcome {
                message: reconcile(&text, accumulator),
                usage,
                selection,
                finish_reason,
            }));
        })
    }

    /// Generates a commit message, writing live text to `input`.
    ///
    /// Returns `None` when there is nothing to commit, on cancellation (silently,
    /// leaving `input` as the last partial left it) and on failure (after
    /// notifying). Never returns an error.
    pub async fn generate(
        &self,
        diff: &str,
        files: &[String],
        progress: &dyn ProgressSink,
        input: &dyn CommitInput,
        notifier: &dyn Notifier,
        cancel: &CancellationToken,
    ) -> Option<CommitMessage> {
        if diff.trim().is_empty() {
            notifier.info("No changes detected");
            return None;
        }

        let mut events = self.stream(diff, files);
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Commit message generation cancelled");
                    return None;
                }
                next = events.next() => next,
            };

            match next {
                Some(Ok(GenerationEvent::Partial { text, .. })) => {
                    progress.report(Some(&text), Some(PARTIAL_PROGRESS_STEP));
                    input.set_value(&text);
                }
                Some(Ok(GenerationEvent::Completed(outcome))) => {
                    return finish(outcome, progress, input, notifier);
                }
                Some(Err(AiError::StreamAborted)) => {
                    info!("Provider stream aborted");
                    return None;
                }
                Some(Err(e)) => {
                    error!(error = %e, "Commit message generation failed");
                    notifier.error(&format!("Error generating commit message: {e}"));
                    return None;
                }
                None => {
                    error!("Generation stream ended without a result");
                    notifier.error("Error generating commit message: stream ended unexpectedly");
                    return None;
                }
            }
        }
    }
}

fn usage_summary(
    selection: &ModelSelection,
    usage: TokenUsage,
    notifier: &dyn Notifier,
) -> String {
    let tokens = usage.total();
    match calculate_cost(selection, usage.input_tokens, usage.output_tokens) {
        Ok(Some(cost)) if cost > 0.0 => format!("Commit usage: {tokens} tokens (Cost: ${cost})"),
        Ok(_) => format!("Commit usage: {tokens} tokens"),
        Err(e) => {
            warn!(error = %e, "Could not price generation");
            notifier.error(&format!("Could not estimate cost: {e}"));
            format!("Commit usage: {tokens} tokens")
        }
    }
}

fn finish(
    outcome: GenerationOutcome,
    progress: &dyn ProgressSink,
    input: &dyn CommitInput,
    notifier: &dyn Notifier,
) -> Option<CommitMessage> {
    let Some(message) = outcome.message else {
        warn!(finish_reason = ?outcome.finish_reason, "No complete commit message in response");
        notifier.warn("Model finished without producing a complete commit message");
        return None;
    };

    let summary = match outcome.usage {
        Some(usage) => usage_summary(&outcome.selection, usage, notifier),
        None => "Commit message generated".to_string(),
    };
    info!(summary = %summary, "Commit message generated");
    progress.report(Some(&summary), Some(100.0));
    input.set_value(&message.to_string());
    Some(message)
}
