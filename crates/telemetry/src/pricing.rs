//! Cost computation for model calls.
//!
//! Prices are in USD per 1 million tokens. Live per-token prices from the
//! [`ModelCache`] win over the static table; the static table covers the
//! first-party models and any config overrides; anything else is billed at
//! the default rate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{MODEL_HAIKU, MODEL_OPUS, MODEL_SONNET, ModelCache};
use ironloom_core::Usage;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    /// Create a new pricing entry.
    pub const fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Rate applied to models nobody has priced.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(3.0, 15.0);

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
    cache: Option<Arc<ModelCache>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();
        prices.insert(MODEL_OPUS.to_string(), ModelPricing::new(5.0, 25.0));
        prices.insert(MODEL_SONNET.to_string(), ModelPricing::new(3.0, 15.0));
        prices.insert(MODEL_HAIKU.to_string(), ModelPricing::new(1.0, 5.0));
        prices.insert("openai/gpt-4o".into(), ModelPricing::new(2.5, 10.0));
        prices.insert("openai/gpt-4o-mini".into(), ModelPricing::new(0.15, 0.6));
        prices.insert("google/gemini-2.0-flash".into(), ModelPricing::new(0.1, 0.4));
        prices.insert("deepseek/deepseek-v3".into(), ModelPricing::new(0.27, 1.1));

        Self {
            prices: RwLock::new(prices),
            cache: None,
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            cache: None,
        }
    }

    /// Consult live prices from `cache` before the static table.
    pub fn with_cache(mut self, cache: Arc<ModelCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Look up static pricing for a model. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        prices.get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(model.into(), pricing);
    }

    /// Compute cost for a model call.
    ///
    /// Order: live cache price (when either per-token price is positive),
    /// exact static entry, longest static entry whose bare name prefixes the
    /// model (`claude-haiku-4-5-20251001` matches `claude-haiku-4-5`), then
    /// [`DEFAULT_PRICING`].
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        if let Some(cache) = &self.cache
            && let Some(info) = cache.get(model)
        {
            let prompt: f64 = info.pricing.prompt.parse().unwrap_or(0.0);
            let completion: f64 = info.pricing.completion.parse().unwrap_or(0.0);
            if prompt > 0.0 || completion > 0.0 {
                return input_tokens as f64 * prompt + output_tokens as f64 * completion;
            }
        }

        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(p) = prices.get(model) {
            return p.cost(input_tokens, output_tokens);
        }

        let model_lower = model.to_lowercase();
        let bare_model = model_lower.rsplit('/').next().unwrap_or(&model_lower);

        let best = prices
            .iter()
            .filter(|(key, _)| {
                let bare_key = key.rsplit('/').next().unwrap_or(key);
                bare_model.starts_with(&bare_key.to_lowercase())
            })
            .max_by_key(|(key, _)| key.rsplit('/').next().unwrap_or(key).len());

        best.map(|(_, p)| *p)
            .unwrap_or(DEFAULT_PRICING)
            .cost(input_tokens, output_tokens)
    }

    /// Cost of a run's aggregate usage.
    pub fn cost_of(&self, model: &str, usage: &Usage) -> f64 {
        self.compute_cost(model, usage.input_tokens, usage.output_tokens)
    }

    /// List all statically priced model names.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironloom_core::provider::{ModelInfo, ModelPricingInfo};

    #[test]
    fn first_party_fallback_prices() {
        let table = PricingTable::with_defaults();
        // Sonnet: $3/M in, $15/M out -> (1000*3 + 500*15) / 1M
        let cost = table.compute_cost(MODEL_SONNET, 1000, 500);
        assert!((cost - 0.0105).abs() < 1e-10);

        let opus = table.compute_cost(MODEL_OPUS, 1_000_000, 1_000_000);
        assert!((opus - 30.0).abs() < 1e-10);

        let haiku = table.compute_cost(MODEL_HAIKU, 1_000_000, 0);
        assert!((haiku - 1.0).abs() < 1e-10);
    }

    #[test]
    fn unknown_model_uses_default_rate() {
        let table = PricingTable::with_defaults();
        let cost = table.compute_cost("unknown/model-xyz", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-10);
    }

    #[test]
    fn versioned_name_matches_prefix() {
        let table = PricingTable::with_defaults();
        let cost = table.compute_cost("openai/gpt-4o-mini-2024-07-18", 1_000_000, 0);
        assert!((cost - 0.15).abs() < 1e-10);
    }

    #[test]
    fn custom_pricing_overrides() {
        let table = PricingTable::empty();
        assert!(table.is_empty());
        table.set("custom/model", ModelPricing::new(1.0, 2.0));
        assert_eq!(table.len(), 1);
        let cost = table.compute_cost("custom/model", 1_000_000, 1_000_000);
        assert!((cost - 3.0).abs() < 1e-10);
    }

    #[test]
    fn live_cache_prices_take_precedence() {
        let cache = Arc::new(ModelCache::new());
        cache.update(vec![ModelInfo {
            id: MODEL_SONNET.into(),
            pricing: ModelPricingInfo {
                prompt: "0.00001".into(),
                completion: "0.00002".into(),
                image: String::new(),
            },
            ..ModelInfo::default()
        }]);
        let table = PricingTable::with_defaults().with_cache(cache);
        let cost = table.compute_cost(MODEL_SONNET, 100, 100);
        assert!((cost - 0.003).abs() < 1e-10);
    }

    #[test]
    fn zero_cache_prices_fall_through() {
        let cache = Arc::new(ModelCache::new());
        cache.update(vec![ModelInfo {
            id: MODEL_HAIKU.into(),
            ..ModelInfo::default()
        }]);
        let table = PricingTable::with_defaults().with_cache(cache);
        let cost = table.compute_cost(MODEL_HAIKU, 1_000_000, 0);
        assert!((cost - 1.0).abs() < 1e-10);
    }

    #[test]
    fn list_models_sorted() {
        let models = PricingTable::with_defaults().models();
        assert!(models.contains(&MODEL_SONNET.to_string()));
        assert!(models.windows(2).all(|w| w[0] <= w[1]));
    }
}
