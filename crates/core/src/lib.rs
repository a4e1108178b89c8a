//! # IronLoom Core
//!
//! Domain types, traits, and error definitions for the IronLoom agent runtime.
//! Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! The seams between subsystems are traits defined here:
//! - [`Provider`] for the model backend
//! - [`Tool`] for anything the agent can call
//! - [`Broadcaster`] for fire-and-forget observers
//!
//! Implementations live in their respective crates, and tests swap them for
//! scripted stand-ins.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, OrchestratorError, ProviderError, Result, ToolError};
pub use event::{BroadcastEvent, Broadcaster, EventBus, NoopBroadcaster};
pub use message::{Message, Role};
pub use provider::{
    ChunkStream, CompletionRequest, CompletionResponse, ModelInfo, Provider, ToolDefinition, Usage,
};
pub use tool::{FnTool, Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
