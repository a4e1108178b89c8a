//! The orchestration manager.
//!
//! Owns every concurrently running builder, the shared sub-agent slots, and
//! the wiring to persistence, audit and broadcast. Cloning a [`Manager`] is
//! cheap and every clone refers to the same state.

use ironloom_agent::{AgentLoop, AgentRunConfig, AgentRunResult, EventSink, LoopError, StreamEvent};
use ironloom_config::OrchestratorConfig;
use ironloom_core::{Broadcaster, OrchestratorError, Usage};
use ironloom_security::{AuditEvent, AuditLogger, AuditOutcome};
use ironloom_telemetry::{MODEL_SONNET, resolve_model};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::builder::BuilderKind;
use crate::delegate::{DelegationDirectory, StaticDirectory, SubAgentSlots};
use crate::postbuild::{
    CustomDashboardPostBuild, DashboardPostBuild, PostBuild, ToolSummaryPostBuild,
};
use crate::record::{AgentRecord, ChatMessage, RunStatus};
use crate::store::Store;
use crate::stream_state::{StreamState, StreamStateSink, StreamStates};
use crate::work_order::{WorkOrder, WorkOrderStatus};

const BUILDER_SLUG: &str = "builder";

/// Limits and locations the manager runs with.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub builder_model: String,
    pub max_concurrent_agents: usize,
    pub agent_timeout: Duration,
    pub max_subagent_tasks: usize,
    pub max_concurrent_subagents: usize,
    pub subagent_max_turns: u32,
    pub subagent_timeout: Duration,
    /// Parent of per-tool build directories.
    pub tools_dir: PathBuf,
}

impl ManagerSettings {
    pub fn from_config(config: &OrchestratorConfig, tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            builder_model: config.builder_model.clone(),
            max_concurrent_agents: config.max_concurrent_agents,
            agent_timeout: Duration::from_secs(config.agent_timeout_minutes * 60),
            max_subagent_tasks: config.max_subagent_tasks,
            max_concurrent_subagents: config.max_concurrent_subagents,
            subagent_max_turns: config.subagent_max_turns,
            subagent_timeout: Duration::from_secs(config.subagent_timeout_minutes * 60),
            tools_dir: tools_dir.into(),
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default(), "tools")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    User,
    Shutdown,
}

impl StopCause {
    fn run_error(self) -> &'static str {
        match self {
            Self::User => "stopped by user",
            Self::Shutdown => "server shutdown",
        }
    }

    fn work_order_result(self) -> &'static str {
        match self {
            Self::User => "agent stopped by user",
            Self::Shutdown => "server shutdown",
        }
    }
}

type SharedCause = Arc<Mutex<Option<StopCause>>>;

struct RunningAgent {
    record: AgentRecord,
    cancel: CancellationToken,
    /// Fires once the run task has fully finished.
    done: CancellationToken,
    stop_cause: SharedCause,
}

impl RunningAgent {
    fn signal(&self, cause: StopCause) {
        *self
            .stop_cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cause);
        self.cancel.cancel();
    }
}

pub(crate) struct Inner {
    pub(crate) agent_loop: Arc<AgentLoop>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) broadcaster: Option<Arc<dyn Broadcaster>>,
    pub(crate) audit: Option<Arc<AuditLogger>>,
    pub(crate) directory: Arc<dyn DelegationDirectory>,
    pub(crate) subagent_slots: SubAgentSlots,
    pub(crate) settings: ManagerSettings,
    post_build: HashMap<BuilderKind, Arc<dyn PostBuild>>,
    active: RwLock<HashMap<String, RunningAgent>>,
    stream_states: Arc<StreamStates>,
}

/// Builds a [`Manager`].
pub struct ManagerBuilder {
    agent_loop: Arc<AgentLoop>,
    store: Arc<dyn Store>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    audit: Option<Arc<AuditLogger>>,
    directory: Arc<dyn DelegationDirectory>,
    settings: ManagerSettings,
    post_build: HashMap<BuilderKind, Arc<dyn PostBuild>>,
}

impl ManagerBuilder {
    pub fn settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn DelegationDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Replace the step run after a successful build of `kind`.
    pub fn post_build(mut self, kind: BuilderKind, step: Arc<dyn PostBuild>) -> Self {
        self.post_build.insert(kind, step);
        self
    }

    pub fn build(self) -> Manager {
        let subagent_slots = SubAgentSlots::new(self.settings.max_concurrent_subagents);
        Manager {
            inner: Arc::new(Inner {
                agent_loop: self.agent_loop,
                store: self.store,
                broadcaster: self.broadcaster,
                audit: self.audit,
                directory: self.directory,
                subagent_slots,
                settings: self.settings,
                post_build: self.post_build,
                active: RwLock::new(HashMap::new()),
                stream_states: Arc::new(StreamStates::default()),
            }),
        }
    }
}

/// Runs builders and delegations concurrently under shared limits.
#[derive(Clone)]
pub struct Manager {
    pub(crate) inner: Arc<Inner>,
}

impl Manager {
    pub fn builder(agent_loop: Arc<AgentLoop>, store: Arc<dyn Store>) -> ManagerBuilder {
        let post_build: HashMap<BuilderKind, Arc<dyn PostBuild>> = HashMap::from([
            (
                BuilderKind::ToolBuilder,
                Arc::new(ToolSummaryPostBuild::new()) as Arc<dyn PostBuild>,
            ),
            (
                BuilderKind::DashboardBuilder,
                Arc::new(DashboardPostBuild) as Arc<dyn PostBuild>,
            ),
            (
                BuilderKind::CustomDashboardBuilder,
                Arc::new(CustomDashboardPostBuild) as Arc<dyn PostBuild>,
            ),
        ]);
        ManagerBuilder {
            agent_loop,
            store,
            broadcaster: None,
            audit: None,
            directory: Arc::new(StaticDirectory::new()),
            settings: ManagerSettings::default(),
            post_build,
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Sub-agents currently running across all delegations.
    pub fn active_subagents(&self) -> usize {
        self.inner.subagent_slots.active()
    }

    /// What is streaming into `thread_id` right now, if anything.
    pub fn stream_state(&self, thread_id: &str) -> Option<StreamState> {
        self.inner.stream_states.snapshot(thread_id)
    }

    /// A sink for a run streaming into `thread_id` as `agent_slug`. Events
    /// update the thread's [`StreamState`] and are then passed to `next`.
    pub fn stream_sink(
        &self,
        thread_id: impl Into<String>,
        agent_slug: impl Into<String>,
        next: Option<Arc<dyn EventSink>>,
    ) -> Arc<dyn EventSink> {
        Arc::new(StreamStateSink {
            states: self.inner.stream_states.clone(),
            thread_id: thread_id.into(),
            agent_slug: agent_slug.into(),
            next,
        })
    }

    /// Drop the live state of `thread_id` once its run has finished.
    pub fn clear_stream_state(&self, thread_id: &str) {
        self.inner.stream_states.clear(thread_id);
    }

    pub(crate) fn broadcast(&self, event_type: &str, payload: Value) {
        if let Some(broadcaster) = &self.inner.broadcaster {
            broadcaster.publish(event_type, payload);
        }
    }

    fn audit(&self, event: AuditEvent, target: &str, outcome: AuditOutcome, details: String) {
        if let Some(audit) = &self.inner.audit {
            audit.log(event, "system", target, outcome, Some(details));
        }
    }

    fn work_dir_for(&self, kind: BuilderKind, order: &WorkOrder) -> Option<PathBuf> {
        if !kind.needs_work_dir() {
            return None;
        }
        Some(if order.target_dir.is_empty() {
            self.inner.settings.tools_dir.join(&order.tool_id)
        } else {
            PathBuf::from(&order.target_dir)
        })
    }

    /// Start a builder run for `order`.
    ///
    /// Fails without side effects when the concurrency ceiling is reached
    /// or the work order cannot start. The returned record is the run as it
    /// was admitted; the run itself continues in the background.
    pub async fn spawn_builder(
        &self,
        kind: BuilderKind,
        order: &WorkOrder,
        thread_id: &str,
    ) -> Result<AgentRecord, OrchestratorError> {
        let inner = &self.inner;
        let order = inner
            .store
            .get_work_order(&order.id)
            .await?
            .ok_or_else(|| OrchestratorError::WorkOrderNotFound(order.id.clone()))?;
        if !order.status.can_transition_to(WorkOrderStatus::InProgress) {
            return Err(OrchestratorError::InvalidTransition {
                id: order.id.clone(),
                from: order.status.to_string(),
                to: WorkOrderStatus::InProgress.to_string(),
            });
        }

        let model = resolve_model(&inner.settings.builder_model, MODEL_SONNET);
        let work_dir = self.work_dir_for(kind, &order);
        let mut record = AgentRecord::running(
            uuid::Uuid::new_v4().to_string(),
            kind,
            model.clone(),
            order.id.clone(),
        );
        record.thread_id = thread_id.to_string();
        record.working_dir = work_dir.clone();

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let stop_cause: SharedCause = Arc::new(Mutex::new(None));
        {
            let mut active = inner.active.write().await;
            if active.len() >= inner.settings.max_concurrent_agents {
                return Err(OrchestratorError::CapacityExceeded {
                    limit: inner.settings.max_concurrent_agents,
                });
            }
            active.insert(
                record.id.clone(),
                RunningAgent {
                    record: record.clone(),
                    cancel: cancel.clone(),
                    done: done.clone(),
                    stop_cause: stop_cause.clone(),
                },
            );
        }

        if let Err(e) = self.admit(&record, &order, work_dir.as_deref()).await {
            inner.active.write().await.remove(&record.id);
            return Err(e);
        }

        self.audit(
            AuditEvent::AgentSpawned {
                kind: kind.as_str().to_string(),
                agent_id: record.id.clone(),
            },
            &order.id,
            AuditOutcome::Success,
            format!("{kind} {}", record.id),
        );
        info!(kind = %kind, agent_id = %record.id, work_order_id = %order.id, "Spawned builder");

        let job = BuilderJob {
            prompt: kind.prompt(&order, work_dir.as_deref()),
            record: record.clone(),
            order,
            model,
            work_dir,
            cancel,
            done,
            stop_cause,
        };
        let manager = self.clone();
        tokio::spawn(async move { manager.run_builder(job).await });

        Ok(record)
    }

    async fn admit(
        &self,
        record: &AgentRecord,
        order: &WorkOrder,
        work_dir: Option<&Path>,
    ) -> Result<(), OrchestratorError> {
        if let Some(dir) = work_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| OrchestratorError::WorkDir(format!("{}: {e}", dir.display())))?;
        }
        let store = &self.inner.store;
        store.save_agent(record.clone()).await?;
        store.attach_agent(&order.id, &record.id).await?;
        store
            .update_work_order_status(&order.id, WorkOrderStatus::InProgress, "")
            .await
    }

    async fn run_builder(self, job: BuilderJob) {
        let _done = job.done.clone().drop_guard();
        let inner = &self.inner;
        let kind = job.record.kind;
        let agent_id = job.record.id.clone();
        let thread_id = job.record.thread_id.clone();

        let sink = Arc::new(BuilderSink {
            kind,
            agent_id: agent_id.clone(),
            work_order_id: job.order.id.clone(),
            thread_id: thread_id.clone(),
            output: Mutex::new(String::new()),
            broadcaster: inner.broadcaster.clone(),
            audit: inner.audit.clone(),
            stream_states: inner.stream_states.clone(),
        });

        let mut config = AgentRunConfig::new(job.model.clone())
            .with_max_turns(kind.max_turns())
            .with_tools(kind.tools().iter().copied())
            .with_sink(sink.clone());
        if let Some(dir) = &job.work_dir {
            config = config.with_work_dir(dir.clone());
        }

        let (outcome, timed_out) = run_with_deadline(
            &inner.agent_loop,
            config,
            &job.prompt,
            job.cancel.clone(),
            inner.settings.agent_timeout,
        )
        .await;

        let output = sink.output();
        let cause = *job
            .stop_cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let outcome = BuildOutcome::classify(outcome, cause, timed_out, inner.settings.agent_timeout);

        let mut record = job.record;
        record.output = output.clone();
        record.usage = outcome.run.usage;
        record.cost_usd = outcome.run.cost_usd;
        record.turns = outcome.run.turns;
        record.finish(outcome.status, outcome.error.clone());
        if let Err(e) = inner.store.save_agent(record.clone()).await {
            warn!(agent_id = %agent_id, error = %e, "Failed to save run record");
        }

        let details = if outcome.error.is_empty() {
            format!("{kind} {agent_id}")
        } else {
            format!("{kind} {agent_id}: {}", outcome.error)
        };
        match outcome.status {
            RunStatus::Completed => self.audit(
                AuditEvent::AgentCompleted {
                    kind: kind.as_str().to_string(),
                    agent_id: agent_id.clone(),
                },
                &job.order.id,
                AuditOutcome::Success,
                details,
            ),
            RunStatus::Failed | RunStatus::Cancelled => self.audit(
                AuditEvent::AgentFailed {
                    kind: kind.as_str().to_string(),
                    agent_id: agent_id.clone(),
                },
                &job.order.id,
                AuditOutcome::Failure,
                details,
            ),
            RunStatus::Stopped | RunStatus::Running => {}
        }

        let (order_status, order_result) = match (outcome.status, cause) {
            (RunStatus::Completed, _) => (WorkOrderStatus::Completed, output.clone()),
            (RunStatus::Stopped, Some(cause)) => {
                (WorkOrderStatus::Failed, cause.work_order_result().to_string())
            }
            (RunStatus::Cancelled, _) => (WorkOrderStatus::Failed, outcome.error.clone()),
            _ => (WorkOrderStatus::Failed, output.clone()),
        };
        if let Err(e) = inner
            .store
            .update_work_order_status(&job.order.id, order_status, &order_result)
            .await
        {
            warn!(work_order_id = %job.order.id, error = %e, "Failed to finish work order");
        }

        let chat_message = if outcome.status == RunStatus::Completed {
            let step = inner.post_build.get(&kind).cloned();
            match step {
                Some(step) => step.run(&job.order, job.work_dir.as_deref(), &output).await,
                None => String::new(),
            }
        } else if outcome.error.is_empty() {
            kind.failure_message().to_string()
        } else {
            format!("{}\n\n**Error:** {}", kind.failure_message(), outcome.error)
        };
        let agent_text = if kind.suppresses_stream() {
            ""
        } else {
            outcome.run.text.trim()
        };
        self.save_build_result(
            &thread_id,
            agent_text,
            &chat_message,
            outcome.run.cost_usd,
            outcome.run.usage,
        )
        .await;
        inner.stream_states.clear(&thread_id);

        self.broadcast(
            "agent_completed",
            json!({
                "agent_id": agent_id,
                "work_order_id": job.order.id,
                "thread_id": thread_id,
                "status": outcome.status.as_str(),
                "output": output,
            }),
        );

        inner.active.write().await.remove(&agent_id);

        match outcome.status {
            RunStatus::Completed => info!(agent_id = %agent_id, "Builder completed"),
            status => error!(agent_id = %agent_id, status = %status.as_str(), error = %outcome.error, "Builder did not complete"),
        }
    }

    /// Persist the builder's own text (if any) and the summary message.
    async fn save_build_result(
        &self,
        thread_id: &str,
        agent_text: &str,
        chat_message: &str,
        cost_usd: f64,
        usage: Usage,
    ) {
        if thread_id.is_empty() {
            return;
        }
        let mut messages = Vec::with_capacity(2);
        if !agent_text.is_empty() && agent_text != chat_message {
            messages.push(
                ChatMessage::assistant(thread_id, BUILDER_SLUG, agent_text)
                    .with_cost(cost_usd, usage),
            );
            let mut card = ChatMessage::assistant(thread_id, BUILDER_SLUG, chat_message);
            card.created_at += chrono::Duration::milliseconds(1);
            messages.push(card);
        } else {
            messages.push(
                ChatMessage::assistant(thread_id, BUILDER_SLUG, chat_message)
                    .with_cost(cost_usd, usage),
            );
        }
        for message in messages {
            if let Err(e) = self.inner.store.append_chat_message(message).await {
                warn!(thread_id, error = %e, "Failed to save build result");
            }
        }
    }

    /// Stop a running builder and wait until it has fully wound down.
    ///
    /// Fails with [`OrchestratorError::AgentFinished`] when the run ended on
    /// its own before the stop took effect.
    pub async fn stop_agent(&self, agent_id: &str) -> Result<(), OrchestratorError> {
        let running = self
            .inner
            .active
            .write()
            .await
            .remove(agent_id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(agent_id.to_string()))?;

        running.signal(StopCause::User);
        running.done.cancelled().await;

        // The run may have completed between removal and the signal landing.
        let status = self
            .inner
            .store
            .get_agent(agent_id)
            .await?
            .map(|record| record.status);
        if status != Some(RunStatus::Stopped) {
            info!(agent_id, "Builder finished before it could be stopped");
            return Err(OrchestratorError::AgentFinished(agent_id.to_string()));
        }

        self.audit(
            AuditEvent::AgentStopped {
                agent_id: agent_id.to_string(),
            },
            &running.record.work_order_id,
            AuditOutcome::Success,
            StopCause::User.run_error().to_string(),
        );
        warn!(agent_id, "Stopped builder");
        Ok(())
    }

    /// Wait for the run `agent_id` to finish. Returns at once if it is not
    /// running.
    pub async fn wait(&self, agent_id: &str) {
        let done = self
            .inner
            .active
            .read()
            .await
            .get(agent_id)
            .map(|running| running.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
    }

    /// Snapshots of every running builder, oldest first.
    pub async fn list_active(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self
            .inner
            .active
            .read()
            .await
            .values()
            .map(|running| running.record.clone())
            .collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        records
    }

    pub async fn active_count(&self) -> usize {
        self.inner.active.read().await.len()
    }

    /// A run by id, live or finished.
    pub async fn get_run(&self, agent_id: &str) -> Result<Option<AgentRecord>, OrchestratorError> {
        let live = self
            .inner
            .active
            .read()
            .await
            .get(agent_id)
            .map(|running| running.record.clone());
        match live {
            Some(record) => Ok(Some(record)),
            None => self.inner.store.get_agent(agent_id).await,
        }
    }

    /// Most recent runs first, live or finished.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<AgentRecord>, OrchestratorError> {
        self.inner.store.list_agents(limit).await
    }

    /// Stop every running builder and wait for all of them.
    pub async fn shutdown(&self) {
        let drained = std::mem::take(&mut *self.inner.active.write().await);
        for running in drained.values() {
            running.signal(StopCause::Shutdown);
        }
        for (agent_id, running) in drained {
            running.done.cancelled().await;
            info!(agent_id = %agent_id, "Stopped builder during shutdown");
        }
    }
}

struct BuilderJob {
    record: AgentRecord,
    order: WorkOrder,
    model: String,
    prompt: String,
    work_dir: Option<PathBuf>,
    cancel: CancellationToken,
    done: CancellationToken,
    stop_cause: SharedCause,
}

struct BuildOutcome {
    run: AgentRunResult,
    status: RunStatus,
    error: String,
}

impl BuildOutcome {
    fn classify(
        outcome: Result<AgentRunResult, LoopError>,
        cause: Option<StopCause>,
        timed_out: bool,
        timeout: Duration,
    ) -> Self {
        match outcome {
            Ok(run) => Self {
                run,
                status: RunStatus::Completed,
                error: String::new(),
            },
            Err(e) => {
                let message = e.to_string();
                let run = e.into_partial().unwrap_or_default();
                let (status, error) = match cause {
                    Some(cause) => (RunStatus::Stopped, cause.run_error().to_string()),
                    None if timed_out => (
                        RunStatus::Cancelled,
                        format!("timed out after {} minutes", timeout.as_secs() / 60),
                    ),
                    None => (RunStatus::Failed, message),
                };
                Self { run, status, error }
            }
        }
    }
}

/// Forwards a builder's events to observers and collects its output.
struct BuilderSink {
    kind: BuilderKind,
    agent_id: String,
    work_order_id: String,
    thread_id: String,
    output: Mutex<String>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    audit: Option<Arc<AuditLogger>>,
    stream_states: Arc<StreamStates>,
}

impl BuilderSink {
    fn output(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn append(&self, text: &str) {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }
}

impl EventSink for BuilderSink {
    fn emit(&self, event: StreamEvent) {
        match &event {
            StreamEvent::TextDelta { text } => self.append(text),
            // The decoder announces a call before its input is known; log
            // the call once, when it is dispatched with input.
            StreamEvent::ToolStart {
                tool_name,
                tool_input: Some(_),
                ..
            } if self.kind.logs_tool_calls() => {
                self.append(&format!("\n[tool: {tool_name}]\n"));
                if let Some(audit) = &self.audit {
                    audit.log(
                        AuditEvent::BuilderToolCall {
                            tool_name: tool_name.clone(),
                        },
                        "system",
                        &self.work_order_id,
                        AuditOutcome::Success,
                        Some(tool_name.clone()),
                    );
                }
            }
            _ => {}
        }

        if self.kind.suppresses_stream() && matches!(event, StreamEvent::TextDelta { .. }) {
            return;
        }
        self.stream_states.observe(&self.thread_id, BUILDER_SLUG, &event);
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.publish(
                "agent_stream",
                json!({
                    "agent_id": self.agent_id,
                    "work_order_id": self.work_order_id,
                    "thread_id": self.thread_id,
                    "event": event,
                }),
            );
        }
    }
}

/// Run `config` until it finishes, `cancel` fires, or `deadline` passes.
///
/// On the deadline the run is cancelled and awaited so its partial result
/// survives. The flag reports whether the deadline was hit.
pub(crate) async fn run_with_deadline(
    agent_loop: &AgentLoop,
    config: AgentRunConfig,
    prompt: &str,
    cancel: CancellationToken,
    deadline: Duration,
) -> (Result<AgentRunResult, LoopError>, bool) {
    let run_cancel = cancel.child_token();
    let run = agent_loop.run(config, prompt, run_cancel.clone());
    tokio::pin!(run);
    let timer = tokio::time::sleep(deadline);
    tokio::pin!(timer);

    tokio::select! {
        result = &mut run => (result, false),
        _ = &mut timer => {
            run_cancel.cancel();
            (run.await, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironloom_agent::StopReason;

    #[test]
    fn settings_follow_config() {
        let settings = ManagerSettings::from_config(&OrchestratorConfig::default(), "/srv/tools");
        assert_eq!(settings.max_concurrent_agents, 5);
        assert_eq!(settings.agent_timeout, Duration::from_secs(3600));
        assert_eq!(settings.subagent_timeout, Duration::from_secs(600));
        assert_eq!(settings.subagent_max_turns, 10);
        assert_eq!(settings.tools_dir, PathBuf::from("/srv/tools"));
    }

    fn partial(text: &str) -> AgentRunResult {
        AgentRunResult {
            text: text.into(),
            turns: 2,
            stop_reason: StopReason::Cancelled,
            ..AgentRunResult::default()
        }
    }

    #[test]
    fn outcome_classification() {
        let timeout = Duration::from_secs(3600);

        let stopped = BuildOutcome::classify(
            Err(LoopError::Cancelled {
                partial: partial("half"),
            }),
            Some(StopCause::User),
            false,
            timeout,
        );
        assert_eq!(stopped.status, RunStatus::Stopped);
        assert_eq!(stopped.error, "stopped by user");
        assert_eq!(stopped.run.text, "half");

        let timed_out = BuildOutcome::classify(
            Err(LoopError::Cancelled {
                partial: partial("partial"),
            }),
            None,
            true,
            timeout,
        );
        assert_eq!(timed_out.status, RunStatus::Cancelled);
        assert_eq!(timed_out.error, "timed out after 60 minutes");
        assert_eq!(timed_out.run.turns, 2);

        let failed = BuildOutcome::classify(Err(LoopError::Auth), None, false, timeout);
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error, "API key invalid or expired");

        let finished =
            BuildOutcome::classify(Ok(partial("all")), Some(StopCause::Shutdown), true, timeout);
        assert_eq!(finished.status, RunStatus::Completed);
    }
}
