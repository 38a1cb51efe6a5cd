//! Usage-based cost estimation.

use crate::ai::error::AiError;
use crate::ai::model_config::{get_model_registry, ModelRegistry};
use crate::ai::provider::{AiProvider, ModelSelection};

/// Estimates the USD cost of a generation, rounded to cents.
///
/// Returns `Ok(None)` for local models, which are not metered, and
/// [`AiError::UnknownModel`] when a hosted model has no pricing entry.
pub fn calculate_cost(
    selection: &ModelSelection,
    input_tokens: u64,
    output_tokens: u64,
) -> Result<Option<f64>, AiError> {
    calculate_cost_with(get_model_registry(), selection, input_tokens, output_tokens)
}

/// Same as [`calculate_cost`] against an explicit registry.
pub fn calculate_cost_with(
    registry: &ModelRegistry,
    selection: &ModelSelection,
    input_tokens: u64,
    output_tokens: u64,
) -> Result<Option<f64>, AiError> {
    if selection.provider == AiProvider::Ollama {
        return Ok(None);
    }

    let pricing = registry
        .get_pricing(selection.provider, &selection.model)
        .ok_or_else(|| AiError::UnknownModel(selection.model.clone()))?;

    let input_cost = pricing.input_per_million / 1_000_000.0 * input_tokens as f64;
    let output_cost = pricing.output_per_million / 1_000_000.0 * output_tokens as f64;

    Ok(Some(round_cents(input_cost + output_cost)))
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
