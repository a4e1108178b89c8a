//! `ironloom build`: create a work order, run its builder, print the result.

use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;
use ironloom_config::AppConfig;
use ironloom_core::{BroadcastEvent, EventBus, OrchestratorError};
use ironloom_orchestrator::{
    BuilderKind, ChatMessage, InMemoryStore, Manager, ManagerSettings, Store, WorkOrder, WorkOrderType,
};
use ironloom_security::AuditLogger;

use super::{build_agent_loop, load_config, require_api_key};

const THREAD_ID: &str = "cli";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuildKind {
    /// JSON dashboard definition
    Dashboard,
    /// Tool service written to its own directory
    Tool,
    /// Standalone HTML dashboard
    CustomDashboard,
}

impl BuildKind {
    pub(crate) fn order_type(self, update: bool) -> WorkOrderType {
        match (self, update) {
            (Self::Dashboard, _) => WorkOrderType::DashboardBuild,
            (Self::Tool, false) => WorkOrderType::ToolBuild,
            (Self::Tool, true) => WorkOrderType::ToolUpdate,
            (Self::CustomDashboard, false) => WorkOrderType::DashboardCustomBuild,
            (Self::CustomDashboard, true) => WorkOrderType::DashboardCustomUpdate,
        }
    }
}

pub struct BuildOptions {
    pub kind: BuildKind,
    pub description: String,
    pub title: String,
    pub requirements: String,
    pub id: String,
    pub target_dir: Option<PathBuf>,
    pub tools_dir: PathBuf,
    pub update: bool,
}

pub(crate) fn work_order(opts: &BuildOptions) -> WorkOrder {
    let mut order = WorkOrder::new(
        opts.kind.order_type(opts.update),
        &opts.title,
        &opts.description,
    )
    .with_requirements(&opts.requirements)
    .with_tool_id(&opts.id)
    .with_thread_id(THREAD_ID)
    .with_created_by("cli");
    if let Some(dir) = &opts.target_dir {
        order = order.with_target_dir(dir.display().to_string());
    }
    order
}

/// Progress line for a broadcast, if it is worth showing.
pub(crate) fn render_broadcast(event: &BroadcastEvent) -> Option<String> {
    if event.event_type != "agent_stream" {
        return None;
    }
    let inner = &event.payload["event"];
    match inner["type"].as_str()? {
        "text_delta" => inner["text"].as_str().map(str::to_string),
        "tool_start" if !inner["tool_input"].is_null() => {
            Some(format!("\n  ⚙️  {}\n", inner["tool_name"].as_str()?))
        }
        _ => None,
    }
}

pub async fn run(opts: BuildOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;
    run_with(&config, build_agent_loop(&config, Arc::new(AuditLogger::new())), opts).await?;
    Ok(())
}

/// Run one build against `agent_loop`, printing progress and the chat result.
///
/// Returns the chat messages the build left on the thread.
pub(crate) async fn run_with(
    config: &AppConfig,
    agent_loop: ironloom_agent::AgentLoop,
    opts: BuildOptions,
) -> Result<Vec<ChatMessage>, Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(EventBus::new(1024));
    let manager = Manager::builder(Arc::new(agent_loop), store.clone())
        .settings(ManagerSettings::from_config(
            &config.orchestrator,
            opts.tools_dir.clone(),
        ))
        .broadcaster(bus.clone())
        .build();

    let order = store.create_work_order(work_order(&opts)).await?;
    let kind = BuilderKind::for_work_order(order.order_type);

    let mut rx = bus.subscribe();
    let printer = tokio::spawn(async move {
        use std::io::Write;
        while let Ok(event) = rx.recv().await {
            if let Some(text) = render_broadcast(&event) {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
        }
    });

    let record = manager.spawn_builder(kind, &order, THREAD_ID).await?;
    eprintln!("  🔨 {kind} {} started (work order {})", record.id, order.id);

    tokio::select! {
        _ = manager.wait(&record.id) => {}
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n  Interrupted, stopping builder...");
            match manager.stop_agent(&record.id).await {
                Ok(()) | Err(OrchestratorError::AgentFinished(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    manager.shutdown().await;
    printer.abort();

    let finished = manager.get_run(&record.id).await?;
    let order = store.get_work_order(&order.id).await?;
    println!();
    if let Some(run) = finished {
        eprintln!(
            "  ── {}: {} turn(s), ${:.4}",
            run.status, run.turns, run.cost_usd
        );
        if !run.error.is_empty() {
            eprintln!("  ERROR: {}", run.error);
        }
    }
    if let Some(order) = order {
        eprintln!("  Work order {}: {}", order.id, order.status);
    }
    let messages = store.chat_messages(THREAD_ID).await?;
    for message in &messages {
        println!("{}", message.content);
    }
    Ok(messages)
}
