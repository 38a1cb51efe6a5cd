//! Shared test utilities for the `ai` module.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::ai::generator::{CommitInput, Notifier, ProgressSink};
use crate::ai::{
    AiClient, AiClientMetadata, AiError, AiProvider, ClientFactory, Credentials, EventStream,
    ModelSelection, StreamEvent, StructuredRequest, TokenUsage,
};
use crate::config::{ConfigSnapshot, ConfigSource};

type ScriptedEvent = Result<StreamEvent, AiError>;

enum Script {
    Events(Vec<ScriptedEvent>),
    Channel(mpsc::UnboundedReceiver<ScriptedEvent>),
    OpenError(AiError),
}

/// Mock AI client that replays a scripted event stream.
///
/// The script is consumed by the first request; later requests fail with
/// `ApiRequestFailed("no more mock responses")`. Every request is recorded
/// so tests can inspect what the generator sent.
pub(crate) struct ScriptedAiClient {
    script: Mutex<Option<Script>>,
    metadata: AiClientMetadata,
    requests: Arc<Mutex<Vec<StructuredRequest>>>,
}

impl ScriptedAiClient {
    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            metadata: AiClientMetadata {
                provider: AiProvider::Ollama,
                model: "mock-model".to_string(),
                base_url: "http://mock".to_string(),
            },
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replays `events` in order, then ends the stream.
    pub(crate) fn new(events: Vec<ScriptedEvent>) -> Self {
        Self::with_script(Script::Events(events))
    }

    /// Streams whatever is sent on the returned channel; dropping the sender ends the stream.
    pub(crate) fn channel() -> (Self, mpsc::UnboundedSender<ScriptedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_script(Script::Channel(rx)), tx)
    }

    /// Fails when the request is opened.
    pub(crate) fn failing(error: AiError) -> Self {
        Self::with_script(Script::OpenError(error))
    }

    /// Handle for inspecting recorded requests after the client was moved.
    pub(crate) fn request_handle(&self) -> Arc<Mutex<Vec<StructuredRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl AiClient for ScriptedAiClient {
    fn stream_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, AiError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            let script = self.script.lock().unwrap().take();
            match script {
                Some(Script::Events(events)) => {
                    Ok(Box::pin(futures::stream::iter(events)) as EventStream)
                }
                Some(Script::Channel(rx)) => Ok(Box::pin(futures::stream::unfold(
                    rx,
                    |mut rx| async move { rx.recv().await.map(|item| (item, rx)) },
                )) as EventStream),
                Some(Script::OpenError(error)) => Err(error),
                None => Err(AiError::ApiRequestFailed(
                    "no more mock responses".to_string(),
                )),
            }
        })
    }

    fn get_metadata(&self) -> AiClientMetadata {
        self.metadata.clone()
    }
}

/// Client factory handing out queued clients and recording what it was asked for.
#[derive(Default)]
pub(crate) struct RecordingClientFactory {
    clients: Mutex<VecDeque<Box<dyn AiClient>>>,
    calls: Mutex<Vec<(ModelSelection, Credentials)>>,
}

impl RecordingClientFactory {
    pub(crate) fn new(clients: Vec<Box<dyn AiClient>>) -> Self {
        Self {
            clients: Mutex::new(clients.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Selections and credentials passed to each `create` call.
    pub(crate) fn calls(&self) -> Vec<(ModelSelection, Credentials)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ClientFactory for RecordingClientFactory {
    fn create(
        &self,
        selection: &ModelSelection,
        credentials: &Credentials,
    ) -> Result<Box<dyn AiClient>, AiError> {
        self.calls
            .lock()
            .unwrap()
            .push((selection.clone(), credentials.clone()));
        self.clients
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AiError::InvalidConfiguration("no mock client queued".to_string()))
    }
}

/// Config source whose snapshot tests can swap between calls.
pub(crate) struct FixtureConfig {
    snapshot: Mutex<Result<ConfigSnapshot, String>>,
}

impl FixtureConfig {
    pub(crate) fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Ok(snapshot)),
        }
    }

    /// Makes every later snapshot fail with an invalid-configuration error.
    pub(crate) fn broken(message: &str) -> Self {
        Self {
            snapshot: Mutex::new(Err(message.to_string())),
        }
    }

    pub(crate) fn set(&self, snapshot: ConfigSnapshot) {
        *self.snapshot.lock().unwrap() = Ok(snapshot);
    }
}

impl ConfigSource for FixtureConfig {
    fn snapshot(&self) -> Result<ConfigSnapshot, AiError> {
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .map_err(AiError::InvalidConfiguration)
    }
}

/// Everything a generation reported, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Recorded {
    Progress(Option<String>, Option<f64>),
    Input(String),
    Info(String),
    Warn(String),
    Error(String),
}

/// Progress sink, commit input and notifier in one, sharing a single log.
#[derive(Default)]
pub(crate) struct Recorder {
    log: Mutex<Vec<Recorded>>,
}

impl Recorder {
    pub(crate) fn log(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// Values written to the commit input, in order.
    pub(crate) fn inputs(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Input(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Error notifications.
    pub(crate) fn errors(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Error(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    fn push(&self, entry: Recorded) {
        self.log.lock().unwrap().push(entry);
    }
}

impl ProgressSink for Recorder {
    fn report(&self, message: Option<&str>, increment: Option<f64>) {
        self.push(Recorded::Progress(message.map(String::from), increment));
    }
}

impl CommitInput for Recorder {
    fn set_value(&self, value: &str) {
        self.push(Recorded::Input(value.to_string()));
    }
}

impl Notifier for Recorder {
    fn info(&self, message: &str) {
        self.push(Recorded::Info(message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.push(Recorded::Warn(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(Recorded::Error(message.to_string()));
    }
}

/// Splits `json` into text deltas of at most `size` characters.
pub(crate) fn text_deltas(json: &str, size: usize) -> Vec<ScriptedEvent> {
    let chars: Vec<char> = json.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| Ok(StreamEvent::TextDelta(chunk.iter().collect())))
        .collect()
}

/// Formats payloads as a server-sent event body.
pub(crate) fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect()
}

/// Drains a provider stream into (text, usage, last finish reason).
pub(crate) async fn collect_events(
    mut events: EventStream,
) -> Result<(String, TokenUsage, Option<String>), AiError> {
    let mut text = String::new();
    let mut usage = TokenUsage::default();
    let mut finish = None;
    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::TextDelta(delta) => text.push_str(&delta),
            StreamEvent::Usage(u) => usage.merge(u),
            StreamEvent::Finish { reason } => finish = reason.or(finish),
        }
    }
    Ok((text, usage, finish))
}
