//! `ironloom models`: resolve a model name and show what the runtime knows
//! about it.

use std::sync::Arc;

use ironloom_config::AppConfig;
use ironloom_providers::OpenAiCompatProvider;
use ironloom_telemetry::{MODEL_SONNET, ModelCache, PricingTable, resolve_model};

use super::{load_config, pricing_table, require_api_key};

/// One line per fact about `model`.
pub(crate) fn describe(model: &str, cache: &ModelCache, pricing: &PricingTable) -> Vec<String> {
    let mut lines = vec![format!("  Model:          {model}")];
    if let Some(info) = cache.get(model)
        && !info.name.is_empty()
    {
        lines.push(format!("  Name:           {}", info.name));
    }
    lines.push(format!(
        "  Max tokens:     {}",
        cache.max_tokens_for_model(model)
    ));
    lines.push(format!("  Context window: {}", cache.context_window(model)));
    let input = pricing.compute_cost(model, 1_000_000, 0);
    let output = pricing.compute_cost(model, 0, 1_000_000);
    lines.push(format!(
        "  Pricing:        ${input:.2} in / ${output:.2} out per 1M tokens"
    ));
    lines
}

pub async fn run(name: Option<&str>, refresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let cache = Arc::new(ModelCache::new());

    if refresh {
        require_api_key(&config)?;
        let provider = OpenAiCompatProvider::from_config(&config.provider);
        let count = cache.refresh_if_stale(&provider).await?;
        eprintln!("  Fetched {count} models from {}", provider.base_url());
    }
    let pricing = pricing_table(&config, cache.clone());

    match name {
        Some(name) => {
            let model = resolve_model(name, &fallback(&config));
            for line in describe(&model, &cache, &pricing) {
                println!("{line}");
            }
        }
        None => {
            println!("  Priced models:");
            for model in pricing.models() {
                println!("    {model}");
            }
            if !cache.is_empty() {
                println!("\n  {} models in the live listing", cache.len());
            }
        }
    }
    Ok(())
}

fn fallback(config: &AppConfig) -> String {
    resolve_model(&config.agent.model, MODEL_SONNET)
}
