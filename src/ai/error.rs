//! Error taxonomy for commit message generation.

use thiserror::Error;

use crate::ai::provider::AiProvider;

/// Errors raised while resolving a provider, streaming a generation or
/// pricing its usage.
#[derive(Error, Debug)]
pub enum AiError {
    /// The selected hosted provider has no API key configured.
    #[error("{provider} API key not configured. Set {env_var} or run `gitcomai config set-key {provider}`")]
    MissingApiKey {
        /// Provider whose key is missing.
        provider: AiProvider,
        /// Environment variable that would supply the key.
        env_var: &'static str,
    },

    /// The configuration cannot be used as-is (unknown provider, bad URL, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The model has no pricing or catalog entry.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The provider rejected a requested capability such as structured output.
    #[error("Unsupported functionality: {0}")]
    UnsupportedFunctionality(String),

    /// The stream was cancelled by the caller.
    #[error("Stream aborted")]
    StreamAborted,

    /// The provider answered with a non-success status.
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// The provider answered with something that could not be decoded.
    #[error("Invalid response format: {0}")]
    InvalidResponseFormat(String),

    /// The request never reached the provider or the connection dropped.
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AiError::InvalidResponseFormat(err.to_string())
        } else {
            AiError::NetworkError(err.to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_message_names_env_var() {
        let err = AiError::MissingApiKey {
            provider: AiProvider::Mistral,
            env_var: "MISTRAL_API_KEY",
        };
        let text = err.to_string();
        assert!(text.contains("mistral API key not configured"));
        assert!(text.contains("MISTRAL_API_KEY"));
    }
}
