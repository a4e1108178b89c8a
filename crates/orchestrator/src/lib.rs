//! Orchestration for IronLoom: concurrent builder runs, parallel delegation
//! to sub-agents, and the work orders they serve.
//!
//! [`Manager`] is the entry point. It admits builder runs up to a fixed
//! ceiling, drives each on its own task under a deadline, and records the
//! outcome against the work order that asked for it. Runs holding the
//! `delegate_task` tool re-enter the manager to fan work out to sub-agents.

pub mod builder;
pub mod delegate;
pub mod manager;
pub mod postbuild;
pub mod record;
pub mod store;
pub mod stream_state;
pub mod work_order;

pub use builder::BuilderKind;
pub use delegate::{
    DELEGATE_TOOL_NAME, DelegateInfo, DelegateProfile, DelegateTaskResult, DelegateTool,
    DelegationDirectory, DelegationRequest, SlotPermit, StaticDirectory, SubAgentSlots,
    delegation_prompt_section,
};
pub use manager::{Manager, ManagerBuilder, ManagerSettings};
pub use postbuild::{
    CustomDashboardPostBuild, DashboardPostBuild, LifecycleError, PostBuild, ToolLifecycle,
    ToolSummaryPostBuild, extract_json,
};
pub use record::{AgentRecord, ChatMessage, RunStatus, SubAgentStatus, SubAgentTask};
pub use store::{InMemoryStore, Store};
pub use stream_state::{StreamState, StreamTool};
pub use work_order::{WorkOrder, WorkOrderStatus, WorkOrderType};
