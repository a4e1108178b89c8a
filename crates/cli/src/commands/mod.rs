//! Subcommand implementations and the wiring they share.

pub mod agent;
pub mod build;
pub mod config_cmd;
pub mod models;
pub mod status;
pub mod tool;

use std::sync::Arc;

use ironloom_agent::AgentLoop;
use ironloom_config::AppConfig;
use ironloom_core::Provider;
use ironloom_providers::OpenAiCompatProvider;
use ironloom_security::AuditLogger;
use ironloom_telemetry::{ModelCache, ModelPricing, PricingTable};

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Fail early with setup instructions when no key is configured.
pub(crate) fn require_api_key(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.has_api_key() {
        return Ok(());
    }
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    IRONLOOM_API_KEY   = 'sk-or-v1-...'");
    eprintln!("    OPENROUTER_API_KEY = 'sk-or-v1-...'");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    Err("No API key found. See above for setup instructions.".into())
}

/// Pricing table seeded with the built-in prices and the config overrides.
pub(crate) fn pricing_table(config: &AppConfig, models: Arc<ModelCache>) -> PricingTable {
    let pricing = PricingTable::with_defaults().with_cache(models);
    for (model, p) in &config.pricing {
        pricing.set(model.clone(), ModelPricing::new(p.input_per_m, p.output_per_m));
    }
    pricing
}

/// Agent loop over `provider` with the catalog and tool limits from `config`.
pub(crate) fn agent_loop_with(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    audit: Arc<AuditLogger>,
) -> AgentLoop {
    let models = Arc::new(ModelCache::new());
    let pricing = Arc::new(pricing_table(config, models.clone()));
    AgentLoop::new(provider)
        .with_catalog(models, pricing)
        .with_tools_config(config.tools.clone())
        .with_audit(audit)
}

/// Agent loop talking to the configured OpenAI-compatible endpoint.
pub(crate) fn build_agent_loop(config: &AppConfig, audit: Arc<AuditLogger>) -> AgentLoop {
    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(&config.provider));
    agent_loop_with(config, provider, audit)
}
