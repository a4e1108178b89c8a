//! End-to-end tests for the IronLoom runtime.
//!
//! These drive the full pipeline with a scripted provider: streamed turns,
//! tool execution against a real directory, sandbox enforcement, delegation
//! from inside a run, and a builder taking a work order to completion.

use std::sync::Arc;

use ironloom_agent::testing::{ScriptedProvider, ScriptedTurn};
use ironloom_agent::{AgentLoop, AgentRunConfig, CollectingSink, StopReason, StreamEvent};
use ironloom_core::{EventBus, ProviderError};
use ironloom_orchestrator::{
    BuilderKind, DelegateProfile, InMemoryStore, Manager, ManagerSettings, RunStatus,
    StaticDirectory, Store, SubAgentStatus, WorkOrder, WorkOrderStatus, WorkOrderType,
};
use ironloom_security::AuditLogger;
use tokio_util::sync::CancellationToken;

fn agent_loop(provider: Arc<ScriptedProvider>) -> AgentLoop {
    AgentLoop::new(provider)
}

#[tokio::test]
async fn run_writes_file_and_reports_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::text_and_tool_calls(
            "Writing the file.",
            &[(
                "call_1",
                "Write",
                r##"{"file_path": "out/report.md", "content": "# Report\n"}"##,
            )],
        ),
        ScriptedTurn::text("All done."),
    ]));
    let sink = Arc::new(CollectingSink::new());
    let config = AgentRunConfig::new("sonnet")
        .with_tools(["Read", "Write"])
        .with_work_dir(tmp.path())
        .with_sink(sink.clone());

    let result = agent_loop(provider.clone())
        .run(config, "write a report", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(tmp.path().join("out/report.md")).unwrap(),
        "# Report\n"
    );
    assert_eq!(result.turns, 2);
    assert_eq!(result.stop_reason, StopReason::Stop);
    assert!(result.text.contains("All done."));
    assert!(result.cost_usd > 0.0);

    // The second request carries the tool result back to the model.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let tool_msg = requests[1].messages.last().unwrap();
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_msg.content.contains("Successfully wrote"));

    let events = sink.events();
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::ToolEnd { tool_name, is_error: false, .. } if tool_name == "Write"
    )));
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Result { num_turns: 2, .. })
    ));
}

#[tokio::test]
async fn sandboxed_run_cannot_escape_its_roots() {
    let tmp = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let target = outside.path().join("escape.txt");
    let args = serde_json::json!({"file_path": target, "content": "x"}).to_string();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(&[("call_1", "Write", args.as_str())]),
        ScriptedTurn::text("Could not write."),
    ]));
    let sink = Arc::new(CollectingSink::new());
    let config = AgentRunConfig::new("sonnet")
        .with_tools(["Read", "Write", "Bash"])
        .with_work_dir(tmp.path())
        .with_sandbox_paths(vec![tmp.path().to_path_buf()])
        .with_sink(sink.clone());

    agent_loop(provider.clone())
        .run(config, "try to escape", CancellationToken::new())
        .await
        .unwrap();

    assert!(!target.exists());
    let offered: Vec<String> = provider.requests()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert!(!offered.contains(&"Bash".to_string()));
    assert!(sink.events().iter().any(|e| matches!(
        e,
        StreamEvent::ToolEnd { is_error: true, .. }
    )));
}

#[tokio::test]
async fn auth_failure_surfaces_as_loop_error() {
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::fail(
        ProviderError::AuthenticationFailed("bad key".into()),
    )]));
    let err = agent_loop(provider)
        .run(
            AgentRunConfig::new("sonnet"),
            "hello",
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "API key invalid or expired");
}

#[tokio::test]
async fn run_delegates_to_sub_agent() {
    // parent asks to delegate, the sub-agent answers, the parent wraps up
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(&[(
            "call_1",
            "delegate_task",
            r#"{"tasks": [{"agent_slug": "researcher", "task": "find the capital of France"}]}"#,
        )]),
        ScriptedTurn::text("Paris."),
        ScriptedTurn::text("The researcher says Paris."),
    ]));
    let loop_ = Arc::new(agent_loop(provider.clone()));
    let store = Arc::new(InMemoryStore::new());
    let directory = StaticDirectory::new().with_agent(
        "researcher",
        "Finds facts",
        DelegateProfile {
            name: "Researcher".into(),
            system_prompt: "You find facts.".into(),
            ..DelegateProfile::default()
        },
    );
    let manager = Manager::builder(loop_.clone(), store.clone())
        .directory(Arc::new(directory))
        .build();

    let config = AgentRunConfig::new("sonnet")
        .with_extra_tool(manager.delegate_tool("thread-9", "router"));
    let result = loop_
        .run(config, "what is the capital of France?", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.turns, 2);
    assert!(result.text.contains("The researcher says Paris."));

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].tools.is_empty());
    let tool_msg = requests[2].messages.last().unwrap();
    assert!(tool_msg.content.contains("\"agent_slug\":\"researcher\""));
    assert!(tool_msg.content.contains("Paris."));

    let tasks = store.subagent_tasks("thread-9").await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, SubAgentStatus::Completed);
}

#[tokio::test]
async fn tool_build_runs_work_order_to_completion() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(&[(
            "call_1",
            "Write",
            r#"{"file_path": "main.py", "content": "print('ok')\n"}"#,
        )]),
        ScriptedTurn::text("Tool is ready."),
    ]));
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(EventBus::new(256));
    let audit = Arc::new(AuditLogger::new());
    let manager = Manager::builder(Arc::new(agent_loop(provider)), store.clone())
        .settings(ManagerSettings {
            tools_dir: tmp.path().to_path_buf(),
            ..ManagerSettings::default()
        })
        .broadcaster(bus.clone())
        .audit(audit.clone())
        .build();
    let mut rx = bus.subscribe();

    let order = store
        .create_work_order(
            WorkOrder::new(WorkOrderType::ToolBuild, "Ping", "Answer ping with ok")
                .with_tool_id("ping"),
        )
        .await
        .unwrap();
    let record = manager
        .spawn_builder(BuilderKind::ToolBuilder, &order, "thread-1")
        .await
        .unwrap();
    manager.wait(&record.id).await;

    assert!(tmp.path().join("ping/main.py").exists());

    let run = manager.get_run(&record.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.output.contains("[tool: Write]"));

    let order = store.get_work_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, WorkOrderStatus::Completed);
    assert_eq!(order.agent_id.as_deref(), Some(record.id.as_str()));

    let messages = store.chat_messages("thread-1").await.unwrap();
    assert!(messages.iter().any(|m| m.content.contains("Build complete!")));

    let actions: Vec<&str> = audit.entries().iter().map(|e| e.event.action()).collect();
    assert_eq!(actions.first(), Some(&"agent_spawned"));
    assert!(actions.contains(&"builder_tool_call"));
    assert_eq!(actions.last(), Some(&"agent_completed"));

    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        if event.event_type == "agent_completed" {
            assert_eq!(event.payload["status"], "completed");
            completed = true;
        }
    }
    assert!(completed);
    assert_eq!(manager.active_count().await, 0);
}
