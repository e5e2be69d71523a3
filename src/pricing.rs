//! Pricing & cost accounting. Per-model rates are carried on
//! `ModelDescriptor` (`src/models.rs`); this module computes per-request
//! cost from them and applies the pricing-override operation.
//!
//! Per-request costs are plain `f64` USD — full precision, no rounding.
//! Fixed-point accumulation into integer hundredths-of-a-cent happens one
//! layer up, in the usage tracker's running totals (`src/usage.rs`),
//! where it matters: a long-lived process accumulating many small
//! charges in `f64` would drift.

use crate::error::PricingError;
use crate::models::{ImagePricing, ModelDescriptor, ModelRegistry};
use serde::{Deserialize, Serialize};

/// Operator-supplied override for a single model's pricing, layered via
/// `PricingSection.overrides` in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRecord {
    pub model: String,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    #[serde(default)]
    pub cached_input_per_1m: Option<f64>,
    #[serde(default)]
    pub image_pricing: Option<ImagePricing>,
}

/// A computed cost breakdown, in USD, for one completed request.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Cost {
    pub input_usd: f64,
    pub output_usd: f64,
    pub image_usd: f64,
}

impl Cost {
    pub fn total_usd(&self) -> f64 {
        self.input_usd + self.output_usd + self.image_usd
    }
}

/// Computes per-request costs against the live `ModelRegistry`, applying
/// operator pricing overrides on top of the built-in table.
pub struct CostCalculator<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> CostCalculator<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    fn model(&self, model_id: &str) -> Result<&ModelDescriptor, PricingError> {
        self.registry
            .get(model_id)
            .ok_or_else(|| PricingError::UnknownModel(model_id.to_string()))
    }

    /// Input/output token cost, splitting off `cached_tokens` at the
    /// model's cached-input rate where one is configured (falling back to
    /// the plain input rate otherwise).
    pub fn chat_cost(
        &self,
        model_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        cached_tokens: u32,
    ) -> Result<Cost, PricingError> {
        let model = self.model(model_id)?;
        let cached_tokens = cached_tokens.min(prompt_tokens);
        let uncached_tokens = prompt_tokens - cached_tokens;

        let uncached_cost = uncached_tokens as f64 / 1_000_000.0 * model.input_per_1m;
        let cached_rate = model.cached_input_per_1m.unwrap_or(model.input_per_1m);
        let cached_cost = cached_tokens as f64 / 1_000_000.0 * cached_rate;

        let output_cost = completion_tokens as f64 / 1_000_000.0 * model.output_per_1m;

        Ok(Cost {
            input_usd: uncached_cost + cached_cost,
            output_usd: output_cost,
            image_usd: 0.0,
        })
    }

    /// Embeddings have no output tokens; cost is input-only.
    pub fn embedding_cost(&self, model_id: &str, prompt_tokens: u32) -> Result<Cost, PricingError> {
        let model = self.model(model_id)?;
        let cost = prompt_tokens as f64 / 1_000_000.0 * model.input_per_1m;
        Ok(Cost {
            input_usd: cost,
            output_usd: 0.0,
            image_usd: 0.0,
        })
    }

    /// Per-image cost for a given size/quality, multiplied by image count.
    pub fn image_cost(
        &self,
        model_id: &str,
        size: &str,
        hd_quality: bool,
        n: u32,
    ) -> Result<Cost, PricingError> {
        let model = self.model(model_id)?;
        let pricing = model
            .image_pricing
            .as_ref()
            .ok_or_else(|| PricingError::UnknownImagePricing {
                size: size.to_string(),
                quality: if hd_quality { "hd" } else { "standard" }.to_string(),
            })?;
        let (standard, hd) = pricing.by_size.get(size).copied().ok_or_else(|| {
            PricingError::UnknownImagePricing {
                size: size.to_string(),
                quality: if hd_quality { "hd" } else { "standard" }.to_string(),
            }
        })?;
        let per_image = if hd_quality { hd } else { standard };
        let total = per_image * n as f64;
        Ok(Cost {
            input_usd: 0.0,
            output_usd: 0.0,
            image_usd: total,
        })
    }
}

/// Builds the `ModelDescriptor` pricing fields that `PricingRecord`
/// overrides touch, leaving every other field of the base descriptor
/// untouched. Used when layering `PricingSection.overrides` atop the
/// default/extra model tables at startup.
pub fn apply_pricing_override(model: &mut ModelDescriptor, record: &PricingRecord) {
    model.input_per_1m = record.input_per_1m;
    model.output_per_1m = record.output_per_1m;
    if record.cached_input_per_1m.is_some() {
        model.cached_input_per_1m = record.cached_input_per_1m;
    }
    if record.image_pricing.is_some() {
        model.image_pricing = record.image_pricing.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelRegistry;

    #[test]
    fn chat_cost_splits_cached_tokens() {
        let registry = ModelRegistry::with_defaults();
        let calc = CostCalculator::new(&registry);
        let cost = calc.chat_cost("gpt-4o", 1_000, 500, 400).unwrap();
        // 600 uncached @ 2.50/1M + 400 cached @ 1.25/1M
        let expected_input = 600.0 / 1_000_000.0 * 2.50 + 400.0 / 1_000_000.0 * 1.25;
        assert!((cost.input_usd - expected_input).abs() < 1e-9);
        let expected_output = 500.0 / 1_000_000.0 * 10.00;
        assert!((cost.output_usd - expected_output).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_errors() {
        let registry = ModelRegistry::with_defaults();
        let calc = CostCalculator::new(&registry);
        assert!(matches!(
            calc.chat_cost("does-not-exist", 1, 1, 0),
            Err(PricingError::UnknownModel(_))
        ));
    }

    #[test]
    fn image_cost_unknown_size_errors() {
        let registry = ModelRegistry::with_defaults();
        let calc = CostCalculator::new(&registry);
        assert!(matches!(
            calc.image_cost("dall-e-3", "512x512", false, 1),
            Err(PricingError::UnknownImagePricing { .. })
        ));
    }
}
