//! Parallel delegation of tasks to specialist sub-agents.
//!
//! A run that holds the `delegate_task` tool can fan a batch of tasks out to
//! other agents. Every task is admitted or the whole batch is refused, the
//! tasks run concurrently, and results come back in input order.

use async_trait::async_trait;
use chrono::Utc;
use ironloom_agent::{AgentRunConfig, StreamEvent};
use ironloom_core::{OrchestratorError, Tool, ToolContext, ToolError, ToolResult, Usage};
use ironloom_telemetry::{MODEL_SONNET, resolve_model};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::manager::{Manager, run_with_deadline};
use crate::record::{SubAgentStatus, SubAgentTask};

pub const DELEGATE_TOOL_NAME: &str = "delegate_task";

const DELEGATED_MODE_PREAMBLE: &str = "\n\n## DELEGATED TASK MODE\nYou have been delegated a specific task by another agent. Complete it concisely and return your findings. Focus only on the task below and do not ask follow-up questions.";

/// An agent a parent may hand work to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateInfo {
    pub slug: String,
    pub name: String,
    pub description: String,
}

/// What a sub-agent runs with.
#[derive(Clone, Default)]
pub struct DelegateProfile {
    pub name: String,
    pub system_prompt: String,
    /// Short or full model name; empty means the default.
    pub model: String,
    pub extra_tools: Vec<Arc<dyn Tool>>,
}

/// Lists and resolves the agents available for delegation.
#[async_trait]
pub trait DelegationDirectory: Send + Sync {
    /// Agents `parent_slug` may delegate to, never including itself.
    async fn available(&self, parent_slug: &str) -> Vec<DelegateInfo>;

    async fn resolve(&self, slug: &str) -> Option<DelegateProfile>;
}

/// A fixed set of delegates.
#[derive(Default)]
pub struct StaticDirectory {
    entries: Vec<(DelegateInfo, DelegateProfile)>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(
        mut self,
        slug: impl Into<String>,
        description: impl Into<String>,
        profile: DelegateProfile,
    ) -> Self {
        let info = DelegateInfo {
            slug: slug.into(),
            name: profile.name.clone(),
            description: description.into(),
        };
        self.entries.push((info, profile));
        self
    }
}

#[async_trait]
impl DelegationDirectory for StaticDirectory {
    async fn available(&self, parent_slug: &str) -> Vec<DelegateInfo> {
        self.entries
            .iter()
            .filter(|(info, _)| info.slug != parent_slug)
            .map(|(info, _)| info.clone())
            .collect()
    }

    async fn resolve(&self, slug: &str) -> Option<DelegateProfile> {
        self.entries
            .iter()
            .find(|(info, _)| info.slug == slug)
            .map(|(_, profile)| profile.clone())
    }
}

/// Global count of running sub-agents, shared by every delegation.
#[derive(Debug)]
pub struct SubAgentSlots {
    active: Arc<AtomicUsize>,
    max: usize,
}

impl SubAgentSlots {
    pub fn new(max: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Reserve `n` slots at once, or none.
    pub fn try_acquire(&self, n: usize) -> Result<Vec<SlotPermit>, OrchestratorError> {
        let max = self.max;
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current + n <= max).then_some(current + n)
            })
            .map_err(|active| OrchestratorError::SubAgentCapacity {
                active,
                requested: n,
                max,
            })?;
        Ok((0..n)
            .map(|_| SlotPermit {
                active: self.active.clone(),
            })
            .collect())
    }
}

/// One reserved sub-agent slot, released on drop.
#[derive(Debug)]
pub struct SlotPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub agent_slug: String,
    pub task: String,
}

impl DelegationRequest {
    pub fn new(agent_slug: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent_slug: agent_slug.into(),
            task: task.into(),
        }
    }
}

/// Outcome of one delegated task, as returned to the delegating model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateTaskResult {
    pub agent_slug: String,
    pub agent_name: String,
    pub task: String,
    pub status: SubAgentStatus,
    pub result: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub cost_usd: f64,
}

impl DelegateTaskResult {
    fn failed(request: &DelegationRequest, agent_name: &str, error: String) -> Self {
        Self {
            agent_slug: request.agent_slug.clone(),
            agent_name: agent_name.to_string(),
            task: request.task.clone(),
            status: SubAgentStatus::Failed,
            result: String::new(),
            error,
            cost_usd: 0.0,
        }
    }
}

/// System prompt section that advertises delegation to a parent agent.
pub fn delegation_prompt_section(agents: &[DelegateInfo], max_tasks: usize) -> String {
    let mut section = String::from("## DELEGATION\n\n");
    section.push_str("You can delegate tasks to specialist agents who work **in parallel** using the `delegate_task` tool.\n\n");
    section.push_str("Use `delegate_task` when independent subtasks would benefit from specialist expertise or from running in parallel.\n\n");
    section.push_str("**Important guidelines:**\n");
    section.push_str("- Each sub-agent receives ONLY the task description (no conversation history)\n");
    section.push_str("- Write clear, self-contained task descriptions with all necessary context\n");
    section.push_str("- Sub-agents return text results; synthesize them into your response\n");
    section.push_str(&format!("- Maximum {max_tasks} tasks per delegation call\n\n"));
    section.push_str("Available agents for delegation:\n");
    for agent in agents {
        section.push_str(&format!(
            "- **{}** (slug: `{}`): {}\n",
            agent.name, agent.slug, agent.description
        ));
    }
    section
}

fn delegated_system_prompt(base: &str) -> String {
    format!(
        "{base}{DELEGATED_MODE_PREAMBLE}\n\nCurrent time: {}",
        Utc::now().format("%A, %B %-d, %Y at %-I:%M %p UTC")
    )
}

/// Cut `s` to at most `max` bytes on a char boundary, marking the cut.
fn preview(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

struct SubAgentJob {
    index: usize,
    thread_id: String,
    parent_slug: String,
    request: DelegationRequest,
    profile: DelegateProfile,
    cancel: CancellationToken,
}

impl Manager {
    /// Run `tasks` on their sub-agents in parallel and collect the results
    /// in input order.
    ///
    /// The batch is refused up front if it is empty, too large, would push
    /// the global sub-agent count past its ceiling, or names an agent the
    /// parent cannot delegate to. Nothing runs in that case.
    pub async fn delegate_task(
        &self,
        thread_id: &str,
        parent_slug: &str,
        tasks: Vec<DelegationRequest>,
        cancel: CancellationToken,
    ) -> Result<Vec<DelegateTaskResult>, OrchestratorError> {
        let settings = &self.inner.settings;
        if tasks.is_empty() {
            return Err(OrchestratorError::NoTasks);
        }
        if tasks.len() > settings.max_subagent_tasks {
            return Err(OrchestratorError::TooManyTasks {
                requested: tasks.len(),
                max: settings.max_subagent_tasks,
            });
        }
        let permits = self.inner.subagent_slots.try_acquire(tasks.len())?;

        let available: HashMap<String, DelegateInfo> = self
            .inner
            .directory
            .available(parent_slug)
            .await
            .into_iter()
            .map(|info| (info.slug.clone(), info))
            .collect();
        let mut profiles = Vec::with_capacity(tasks.len());
        for request in &tasks {
            if !available.contains_key(&request.agent_slug) {
                return Err(OrchestratorError::UnknownDelegate(request.agent_slug.clone()));
            }
            let Some(mut profile) = self.inner.directory.resolve(&request.agent_slug).await else {
                return Err(OrchestratorError::UnknownDelegate(request.agent_slug.clone()));
            };
            if profile.name.is_empty() {
                profile.name = available[&request.agent_slug].name.clone();
            }
            profiles.push(profile);
        }

        self.broadcast(
            "subagent_status",
            json!({
                "thread_id": thread_id,
                "parent_slug": parent_slug,
                "status": "delegation_started",
                "task_count": tasks.len(),
            }),
        );

        let mut slots: Vec<Option<DelegateTaskResult>> = vec![None; tasks.len()];
        let mut set = JoinSet::new();
        for (index, ((request, profile), permit)) in tasks
            .iter()
            .cloned()
            .zip(profiles)
            .zip(permits)
            .enumerate()
        {
            let manager = self.clone();
            let job = SubAgentJob {
                index,
                thread_id: thread_id.to_string(),
                parent_slug: parent_slug.to_string(),
                request,
                profile,
                cancel: cancel.child_token(),
            };
            set.spawn(async move {
                let outcome = manager.run_subagent(&job).await;
                drop(permit);
                (job.index, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "Sub-agent task aborted"),
            }
        }

        let results: Vec<DelegateTaskResult> = slots
            .into_iter()
            .zip(&tasks)
            .map(|(slot, request)| {
                slot.unwrap_or_else(|| {
                    let name = available
                        .get(&request.agent_slug)
                        .map(|info| info.name.as_str())
                        .unwrap_or_default();
                    DelegateTaskResult::failed(
                        request,
                        name,
                        format!("sub-agent {} failed: task aborted", request.agent_slug),
                    )
                })
            })
            .collect();

        self.broadcast(
            "subagent_status",
            json!({
                "thread_id": thread_id,
                "parent_slug": parent_slug,
                "status": "delegation_completed",
                "task_count": tasks.len(),
            }),
        );
        info!(parent = parent_slug, tasks = results.len(), "Delegation completed");
        Ok(results)
    }

    async fn run_subagent(&self, job: &SubAgentJob) -> DelegateTaskResult {
        let inner = &self.inner;
        let slug = job.request.agent_slug.clone();
        let subagent_id = uuid::Uuid::new_v4().to_string();
        let task_summary = preview(&job.request.task, 97);

        let mut record = SubAgentTask {
            id: subagent_id.clone(),
            thread_id: job.thread_id.clone(),
            parent_slug: job.parent_slug.clone(),
            agent_slug: slug.clone(),
            task: job.request.task.clone(),
            status: SubAgentStatus::Running,
            result: String::new(),
            error: String::new(),
            cost_usd: 0.0,
            usage: Usage::default(),
            started_at: Utc::now(),
            completed_at: None,
        };
        if let Err(e) = inner.store.save_subagent_task(record.clone()).await {
            warn!(subagent_id = %subagent_id, error = %e, "Failed to record sub-agent task");
        }

        self.broadcast(
            "subagent_status",
            json!({
                "thread_id": job.thread_id,
                "parent_slug": job.parent_slug,
                "subagent_id": subagent_id,
                "agent_slug": slug,
                "agent_name": job.profile.name,
                "status": "started",
                "task_summary": task_summary,
            }),
        );

        let broadcaster = inner.broadcaster.clone();
        let (thread_id, parent_slug, stream_slug, stream_id) = (
            job.thread_id.clone(),
            job.parent_slug.clone(),
            slug.clone(),
            subagent_id.clone(),
        );
        let sink = move |event: StreamEvent| {
            if let (Some(broadcaster), StreamEvent::TextDelta { text }) = (&broadcaster, event)
                && !text.is_empty()
            {
                broadcaster.publish(
                    "subagent_stream",
                    json!({
                        "thread_id": thread_id,
                        "parent_slug": parent_slug,
                        "subagent_id": stream_id,
                        "agent_slug": stream_slug,
                        "text": text,
                    }),
                );
            }
        };

        let mut config = AgentRunConfig::new(resolve_model(&job.profile.model, MODEL_SONNET))
            .with_system_prompt(delegated_system_prompt(&job.profile.system_prompt))
            .with_max_turns(inner.settings.subagent_max_turns)
            .with_sink(Arc::new(sink));
        for tool in &job.profile.extra_tools {
            if tool.name() != DELEGATE_TOOL_NAME {
                config = config.with_extra_tool(tool.clone());
            }
        }

        let (outcome, timed_out) = run_with_deadline(
            &inner.agent_loop,
            config,
            &job.request.task,
            job.cancel.clone(),
            inner.settings.subagent_timeout,
        )
        .await;

        let mut result = DelegateTaskResult {
            agent_slug: slug.clone(),
            agent_name: job.profile.name.clone(),
            task: job.request.task.clone(),
            status: SubAgentStatus::Completed,
            result: String::new(),
            error: String::new(),
            cost_usd: 0.0,
        };
        match outcome {
            Ok(run) => {
                result.result = run.text.trim().to_string();
                result.cost_usd = run.cost_usd;
                record.usage = run.usage;
            }
            Err(e) => {
                result.status = SubAgentStatus::Failed;
                result.error = if timed_out {
                    format!(
                        "sub-agent {slug} failed: timed out after {} minutes",
                        inner.settings.subagent_timeout.as_secs() / 60
                    )
                } else {
                    format!("sub-agent {slug} failed: {e}")
                };
                warn!(agent = %slug, error = %result.error, "Sub-agent failed");
                if let Some(partial) = e.into_partial() {
                    result.result = partial.text.trim().to_string();
                    result.cost_usd = partial.cost_usd;
                    record.usage = partial.usage;
                }
            }
        }

        record.status = result.status;
        record.result = result.result.clone();
        record.error = result.error.clone();
        record.cost_usd = result.cost_usd;
        record.completed_at = Some(Utc::now());
        if let Err(e) = inner.store.save_subagent_task(record).await {
            warn!(subagent_id = %subagent_id, error = %e, "Failed to update sub-agent task");
        }

        self.broadcast(
            "subagent_status",
            json!({
                "thread_id": job.thread_id,
                "parent_slug": job.parent_slug,
                "subagent_id": subagent_id,
                "agent_slug": slug,
                "agent_name": result.agent_name,
                "status": result.status,
                "task_summary": task_summary,
                "result_preview": preview(&result.result, 200),
                "cost_usd": result.cost_usd,
            }),
        );
        result
    }

    /// The `delegate_task` tool for a run of `parent_slug` in `thread_id`.
    pub fn delegate_tool(
        &self,
        thread_id: impl Into<String>,
        parent_slug: impl Into<String>,
    ) -> Arc<dyn Tool> {
        Arc::new(DelegateTool {
            manager: self.clone(),
            thread_id: thread_id.into(),
            parent_slug: parent_slug.into(),
        })
    }
}

#[derive(Deserialize)]
struct DelegateArgs {
    #[serde(default)]
    tasks: Vec<DelegationRequest>,
}

/// Tool handle onto [`Manager::delegate_task`].
pub struct DelegateTool {
    manager: Manager,
    thread_id: String,
    parent_slug: String,
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        DELEGATE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Delegate one or more tasks to specialist agents. All tasks run in parallel and their results are returned together, in the order given."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "description": "Tasks to delegate, one per sub-agent",
                    "items": {
                        "type": "object",
                        "properties": {
                            "agent_slug": {
                                "type": "string",
                                "description": "Slug of the agent to delegate to"
                            },
                            "task": {
                                "type": "string",
                                "description": "Self-contained task description"
                            }
                        },
                        "required": ["agent_slug", "task"]
                    }
                }
            },
            "required": ["tasks"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
        let args: DelegateArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        match self
            .manager
            .delegate_task(&self.thread_id, &self.parent_slug, args.tasks, ctx.cancel.clone())
            .await
        {
            Ok(results) => serde_json::to_string(&results)
                .map(ToolResult::ok)
                .map_err(|e| ToolError::ExecutionFailed(e.to_string())),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
