//! `ironloom status`: show the effective settings.

use ironloom_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let o = &config.orchestrator;

    println!("🧵 IronLoom Status");
    println!("==================");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Endpoint:       {}", config.provider.base_url);
    println!("  Model:          {}", config.agent.model);
    println!("  Max turns:      {}", config.agent.max_turns);
    println!("  Builder model:  {}", o.builder_model);
    println!(
        "  Builders:       {} concurrent, {} min timeout",
        o.max_concurrent_agents, o.agent_timeout_minutes
    );
    println!(
        "  Sub-agents:     {} per delegation, {} concurrent, {} turns, {} min timeout",
        o.max_subagent_tasks,
        o.max_concurrent_subagents,
        o.subagent_max_turns,
        o.subagent_timeout_minutes
    );
    println!(
        "  Bash:           {}s default, {}s max",
        config.tools.bash_timeout_secs, config.tools.bash_max_timeout_secs
    );
    println!(
        "  API key:        {}",
        if config.has_api_key() { "set" } else { "missing" }
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file; write one with `ironloom config default`");
    }

    Ok(())
}
