//! The agent runtime loop.
//!
//! A run alternates between streaming a completion and executing the tools
//! the model asked for:
//!
//! 1. **Stream** the conversation to the provider and decode the SSE lines
//! 2. **Append** the assistant turn (text + tool calls)
//! 3. **Execute** each tool call through the sandboxed executor
//! 4. **Append** the (truncated) tool results and loop back to step 1
//!
//! The loop ends when the model stops asking for tools, the turn cap is
//! reached, the provider fails, or the run is cancelled.

pub mod decoder;
pub mod loop_runner;
pub mod one_shot;
pub mod stream_event;
pub mod truncate;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use decoder::{StreamDecoder, StreamResult};
pub use loop_runner::{
    AgentLoop, AgentRunConfig, AgentRunResult, DEFAULT_MAX_TURNS, LoopError, StopReason,
};
pub use one_shot::{OneShotResult, run_one_shot};
pub use stream_event::{CollectingSink, EventSink, NoopSink, StreamEvent};
