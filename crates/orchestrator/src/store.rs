//! Persistence boundary for orchestration state.

use async_trait::async_trait;
use ironloom_core::OrchestratorError;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::record::{AgentRecord, ChatMessage, SubAgentTask};
use crate::work_order::{WorkOrder, WorkOrderStatus};

/// Storage for work orders, run records, delegated tasks and chat output.
///
/// Reads return owned copies. Implementations must be safe to call from
/// many runs at once.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_work_order(&self, order: WorkOrder) -> Result<WorkOrder, OrchestratorError>;

    async fn get_work_order(&self, id: &str) -> Result<Option<WorkOrder>, OrchestratorError>;

    /// Link a run to its work order.
    async fn attach_agent(&self, work_order_id: &str, agent_id: &str)
    -> Result<(), OrchestratorError>;

    /// Move a work order along its lifecycle. Illegal moves are rejected.
    async fn update_work_order_status(
        &self,
        id: &str,
        status: WorkOrderStatus,
        result: &str,
    ) -> Result<(), OrchestratorError>;

    /// Insert or replace a run record.
    async fn save_agent(&self, record: AgentRecord) -> Result<(), OrchestratorError>;

    async fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>, OrchestratorError>;

    /// Most recent first.
    async fn list_agents(&self, limit: usize) -> Result<Vec<AgentRecord>, OrchestratorError>;

    /// Insert or replace a delegated task record.
    async fn save_subagent_task(&self, task: SubAgentTask) -> Result<(), OrchestratorError>;

    async fn subagent_tasks(&self, thread_id: &str)
    -> Result<Vec<SubAgentTask>, OrchestratorError>;

    async fn append_chat_message(&self, message: ChatMessage) -> Result<(), OrchestratorError>;

    /// Oldest first.
    async fn chat_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>, OrchestratorError>;
}

#[derive(Default)]
struct Tables {
    work_orders: HashMap<String, WorkOrder>,
    agents: HashMap<String, AgentRecord>,
    subagent_tasks: Vec<SubAgentTask>,
    chat_messages: Vec<ChatMessage>,
}

/// In-memory store, for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(id: &str) -> OrchestratorError {
    OrchestratorError::WorkOrderNotFound(id.to_string())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_work_order(&self, order: WorkOrder) -> Result<WorkOrder, OrchestratorError> {
        let mut tables = self.tables.write().await;
        if tables.work_orders.contains_key(&order.id) {
            return Err(OrchestratorError::Store(format!(
                "duplicate work order id: {}",
                order.id
            )));
        }
        tables.work_orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn get_work_order(&self, id: &str) -> Result<Option<WorkOrder>, OrchestratorError> {
        Ok(self.tables.read().await.work_orders.get(id).cloned())
    }

    async fn attach_agent(
        &self,
        work_order_id: &str,
        agent_id: &str,
    ) -> Result<(), OrchestratorError> {
        let mut tables = self.tables.write().await;
        let order = tables
            .work_orders
            .get_mut(work_order_id)
            .ok_or_else(|| missing(work_order_id))?;
        order.agent_id = Some(agent_id.to_string());
        order.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_work_order_status(
        &self,
        id: &str,
        status: WorkOrderStatus,
        result: &str,
    ) -> Result<(), OrchestratorError> {
        let mut tables = self.tables.write().await;
        let order = tables.work_orders.get_mut(id).ok_or_else(|| missing(id))?;
        order.transition(status, result)
    }

    async fn save_agent(&self, record: AgentRecord) -> Result<(), OrchestratorError> {
        self.tables
            .write()
            .await
            .agents
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>, OrchestratorError> {
        Ok(self.tables.read().await.agents.get(id).cloned())
    }

    async fn list_agents(&self, limit: usize) -> Result<Vec<AgentRecord>, OrchestratorError> {
        let tables = self.tables.read().await;
        let mut agents: Vec<AgentRecord> = tables.agents.values().cloned().collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        agents.truncate(limit);
        Ok(agents)
    }

    async fn save_subagent_task(&self, task: SubAgentTask) -> Result<(), OrchestratorError> {
        let mut tables = self.tables.write().await;
        match tables.subagent_tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => tables.subagent_tasks.push(task),
        }
        Ok(())
    }

    async fn subagent_tasks(
        &self,
        thread_id: &str,
    ) -> Result<Vec<SubAgentTask>, OrchestratorError> {
        Ok(self
            .tables
            .read()
            .await
            .subagent_tasks
            .iter()
            .filter(|t| t.thread_id == thread_id)
            .cloned()
            .collect())
    }

    async fn append_chat_message(&self, message: ChatMessage) -> Result<(), OrchestratorError> {
        self.tables.write().await.chat_messages.push(message);
        Ok(())
    }

    async fn chat_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>, OrchestratorError> {
        Ok(self
            .tables
            .read()
            .await
            .chat_messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderKind;
    use crate::record::SubAgentStatus;
    use crate::work_order::WorkOrderType;

    #[tokio::test]
    async fn work_order_lifecycle_through_store() {
        let store = InMemoryStore::new();
        let order = store
            .create_work_order(WorkOrder::new(WorkOrderType::ToolBuild, "t", "d"))
            .await
            .unwrap();

        store.attach_agent(&order.id, "agent-1").await.unwrap();
        store
            .update_work_order_status(&order.id, WorkOrderStatus::InProgress, "")
            .await
            .unwrap();
        store
            .update_work_order_status(&order.id, WorkOrderStatus::Completed, "built")
            .await
            .unwrap();

        let stored = store.get_work_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(stored.status, WorkOrderStatus::Completed);
        assert_eq!(stored.result, "built");

        assert!(
            store
                .update_work_order_status(&order.id, WorkOrderStatus::Failed, "")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn unknown_work_order() {
        let store = InMemoryStore::new();
        let err = store.attach_agent("nope", "a").await.unwrap_err();
        assert_eq!(err, OrchestratorError::WorkOrderNotFound("nope".into()));
        assert!(store.get_work_order("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_work_order_rejected() {
        let store = InMemoryStore::new();
        let order = WorkOrder::new(WorkOrderType::ToolBuild, "t", "d");
        store.create_work_order(order.clone()).await.unwrap();
        assert!(store.create_work_order(order).await.is_err());
    }

    #[tokio::test]
    async fn agent_records_upsert_and_list_newest_first() {
        let store = InMemoryStore::new();
        let mut first = AgentRecord::running("a1", BuilderKind::ToolBuilder, "m", "wo");
        first.created_at -= chrono::Duration::seconds(5);
        let second = AgentRecord::running("a2", BuilderKind::DashboardBuilder, "m", "wo");
        store.save_agent(first.clone()).await.unwrap();
        store.save_agent(second).await.unwrap();

        first.finish(crate::record::RunStatus::Completed, "");
        store.save_agent(first).await.unwrap();

        let listed = store.list_agents(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "a2");
        assert_eq!(listed[1].status, crate::record::RunStatus::Completed);
        assert_eq!(store.list_agents(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subagent_tasks_and_chat_are_per_thread() {
        let store = InMemoryStore::new();
        let mut task = SubAgentTask {
            id: "s1".into(),
            thread_id: "t1".into(),
            parent_slug: "lead".into(),
            agent_slug: "researcher".into(),
            task: "look".into(),
            status: SubAgentStatus::Running,
            result: String::new(),
            error: String::new(),
            cost_usd: 0.0,
            usage: Default::default(),
            started_at: chrono::Utc::now(),
            completed_at: None,
        };
        store.save_subagent_task(task.clone()).await.unwrap();
        task.status = SubAgentStatus::Completed;
        store.save_subagent_task(task).await.unwrap();

        let tasks = store.subagent_tasks("t1").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, SubAgentStatus::Completed);
        assert!(store.subagent_tasks("t2").await.unwrap().is_empty());

        store
            .append_chat_message(ChatMessage::assistant("t1", "builder", "one"))
            .await
            .unwrap();
        store
            .append_chat_message(ChatMessage::assistant("t2", "builder", "other"))
            .await
            .unwrap();
        store
            .append_chat_message(ChatMessage::assistant("t1", "builder", "two"))
            .await
            .unwrap();
        let messages = store.chat_messages("t1").await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }
}
