//! `ironloom config`: configuration management commands.

use clap::Subcommand;
use ironloom_config::AppConfig;

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Print the config file path
    Path,
    /// Print the default configuration
    Default,
    /// Load and validate the configuration
    Validate,
}

pub async fn run(action: Option<ConfigAction>) -> Result<(), Box<dyn std::error::Error>> {
    match action.unwrap_or(ConfigAction::Default) {
        ConfigAction::Show => show(),
        ConfigAction::Path => {
            println!("{}", AppConfig::config_dir().join("config.toml").display());
            Ok(())
        }
        ConfigAction::Default => {
            print!("{}", AppConfig::default_toml());
            Ok(())
        }
        ConfigAction::Validate => validate(),
    }
}

fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub(crate) fn redacted(mut config: AppConfig) -> AppConfig {
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("***".into());
    }
    config
}

/// Advisory findings that do not stop the config from loading.
pub(crate) fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set IRONLOOM_API_KEY or OPENROUTER_API_KEY)");
    }
    if config.agent.sandbox_paths.is_empty() {
        warnings.push("No sandbox paths configured; file tools are unconfined");
    }
    if config.orchestrator.max_concurrent_subagents < config.orchestrator.max_subagent_tasks {
        warnings.push("max_concurrent_subagents is below max_subagent_tasks; large delegations will be refused");
    }
    warnings
}

fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Endpoint:  {}", config.provider.base_url);
    println!("   Model:     {}", config.agent.model);
    println!("   Builder:   {}", config.orchestrator.builder_model);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_hides_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-or-v1-secret".into());
        let text = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("***"));
    }

    #[test]
    fn warns_about_missing_key_and_sandbox() {
        let mut config = AppConfig::default();
        config.provider.api_key = None;
        let found = warnings(&config);
        assert!(found.iter().any(|w| w.contains("No API key")));
        assert!(found.iter().any(|w| w.contains("sandbox")));

        config.provider.api_key = Some("k".into());
        config.agent.sandbox_paths = vec!["/srv".into()];
        assert!(warnings(&config).is_empty());
    }
}
