//! Live streaming state per chat thread.
//!
//! While an agent streams into a thread its text and tool calls so far are
//! kept here, so a client that attaches mid-run can catch up from a snapshot
//! before following the broadcast stream. Entries are dropped when the run
//! finishes.

use ironloom_agent::{EventSink, StreamEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// What an agent has streamed into a thread so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamState {
    pub active: bool,
    pub text: String,
    pub agent_slug: String,
    pub tools: Vec<StreamTool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamTool {
    pub name: String,
    pub id: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// Per-thread registry. Every lock is held only to copy or patch one entry.
#[derive(Debug, Default)]
pub(crate) struct StreamStates {
    threads: RwLock<HashMap<String, StreamState>>,
}

impl StreamStates {
    pub(crate) fn snapshot(&self, thread_id: &str) -> Option<StreamState> {
        self.threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thread_id)
            .cloned()
    }

    pub(crate) fn append_text(&self, thread_id: &str, agent_slug: &str, text: &str) {
        if thread_id.is_empty() {
            return;
        }
        let mut threads = self.threads.write().unwrap_or_else(PoisonError::into_inner);
        let state = threads.entry(thread_id.to_string()).or_default();
        state.active = true;
        state.agent_slug = agent_slug.to_string();
        state.text.push_str(text);
    }

    /// Replace the tool with the same id, or append it.
    pub(crate) fn update_tool(&self, thread_id: &str, tool: StreamTool) {
        if thread_id.is_empty() {
            return;
        }
        let mut threads = self.threads.write().unwrap_or_else(PoisonError::into_inner);
        let state = threads.entry(thread_id.to_string()).or_default();
        state.active = true;
        match state.tools.iter_mut().find(|t| t.id == tool.id) {
            Some(existing) => *existing = tool,
            None => state.tools.push(tool),
        }
    }

    pub(crate) fn clear(&self, thread_id: &str) {
        self.threads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(thread_id);
    }

    /// Fold one run event into the thread's state.
    pub(crate) fn observe(&self, thread_id: &str, agent_slug: &str, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { text } if !text.is_empty() => {
                self.append_text(thread_id, agent_slug, text);
            }
            StreamEvent::ToolStart {
                tool_name, tool_id, ..
            } => self.update_tool(
                thread_id,
                StreamTool {
                    name: tool_name.clone(),
                    id: tool_id.clone(),
                    done: false,
                    detail: String::new(),
                },
            ),
            StreamEvent::ToolEnd {
                tool_name,
                tool_id,
                is_error,
                ..
            } => self.update_tool(
                thread_id,
                StreamTool {
                    name: tool_name.clone(),
                    id: tool_id.clone(),
                    done: true,
                    detail: if *is_error { "error".into() } else { String::new() },
                },
            ),
            _ => {}
        }
    }
}

/// Records a run's events into its thread's [`StreamState`] and passes them
/// on to `next`.
pub(crate) struct StreamStateSink {
    pub(crate) states: Arc<StreamStates>,
    pub(crate) thread_id: String,
    pub(crate) agent_slug: String,
    pub(crate) next: Option<Arc<dyn EventSink>>,
}

impl EventSink for StreamStateSink {
    fn emit(&self, event: StreamEvent) {
        self.states.observe(&self.thread_id, &self.agent_slug, &event);
        if let Some(next) = &self.next {
            next.emit(event);
        }
    }
}
