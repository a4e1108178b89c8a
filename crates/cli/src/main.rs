//! IronLoom CLI, the main entry point.
//!
//! Commands:
//! - `run`     Stream a multi-turn agent run with tools
//! - `once`    Single completion, no tools
//! - `build`   Run a builder against a work order
//! - `tool`    Execute one built-in tool directly
//! - `models`  Resolve a model name and show its limits and pricing
//! - `config`  Show, locate or print the default configuration
//! - `status`  Show the effective settings

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ironloom",
    about = "IronLoom: streaming agent runtime and builder orchestration",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent loop on a prompt, streaming events as they arrive
    Run {
        prompt: String,

        /// Model name (`haiku`, `sonnet`, `opus`, or a full id)
        #[arg(short, long)]
        model: Option<String>,

        /// Turn cap
        #[arg(long)]
        max_turns: Option<u32>,

        /// Directory tools resolve relative paths against
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        /// Confine file tools to this directory (repeatable)
        #[arg(long = "sandbox", value_name = "DIR")]
        sandbox: Vec<PathBuf>,

        /// Comma-separated tool names (defaults to every built-in tool)
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Print every event as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Run a single completion without tools
    Once {
        prompt: String,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(short, long, default_value = "")]
        system: String,
    },

    /// Run a builder for a new work order and wait for it
    Build {
        #[arg(value_enum)]
        kind: commands::build::BuildKind,

        /// What to build
        description: String,

        #[arg(short, long, default_value = "Untitled")]
        title: String,

        #[arg(short, long, default_value = "")]
        requirements: String,

        /// Tool or dashboard id; names the build directory
        #[arg(long, default_value = "build")]
        id: String,

        /// Build directory (defaults to `<tools-dir>/<id>`)
        #[arg(long)]
        target_dir: Option<PathBuf>,

        /// Parent of per-tool build directories
        #[arg(long, default_value = "tools")]
        tools_dir: PathBuf,

        /// Update an existing build instead of creating one
        #[arg(long)]
        update: bool,
    },

    /// Execute a built-in tool directly
    Tool {
        name: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,

        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        #[arg(long = "sandbox", value_name = "DIR")]
        sandbox: Vec<PathBuf>,
    },

    /// Resolve a model name and show its limits and pricing
    Models {
        /// Short or full model name
        name: Option<String>,

        /// Fetch the live model listing first
        #[arg(long)]
        refresh: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },

    /// Show the effective settings
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run {
            prompt,
            model,
            max_turns,
            work_dir,
            sandbox,
            tools,
            system,
            json,
        } => {
            commands::agent::run(commands::agent::RunOptions {
                prompt,
                model,
                max_turns,
                work_dir,
                sandbox,
                tools,
                system,
                json,
            })
            .await?
        }
        Commands::Once {
            prompt,
            model,
            system,
        } => commands::agent::once(&prompt, model.as_deref(), &system).await?,
        Commands::Build {
            kind,
            description,
            title,
            requirements,
            id,
            target_dir,
            tools_dir,
            update,
        } => {
            commands::build::run(commands::build::BuildOptions {
                kind,
                description,
                title,
                requirements,
                id,
                target_dir,
                tools_dir,
                update,
            })
            .await?
        }
        Commands::Tool {
            name,
            args,
            work_dir,
            sandbox,
        } => commands::tool::run(&name, &args, work_dir, sandbox).await?,
        Commands::Models { name, refresh } => commands::models::run(name.as_deref(), refresh).await?,
        Commands::Config { action } => commands::config_cmd::run(action).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
