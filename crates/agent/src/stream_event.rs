//! Per-run streaming events.
//!
//! `StreamEvent` is what observers of a run see: text as it arrives, tool
//! calls as they start and finish, and a final `result` summary. Events are
//! delivered to an [`EventSink`] in emission order.

use ironloom_core::provider::Usage;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Events emitted by the decoder and the agent loop.
///
/// - `init`        first valid chunk of a turn arrived
/// - `text_delta`  partial text from the model
/// - `tool_start`  a tool call was announced (while streaming) or is about to run
/// - `tool_delta`  argument fragment, or a progress tick while a tool runs
/// - `tool_end`    tool finished, with its real output
/// - `result`      run summary
/// - `error`       run failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Init,

    TextDelta {
        text: String,
    },

    ToolStart {
        tool_name: String,
        tool_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_input: Option<serde_json::Value>,
    },

    ToolDelta {
        tool_name: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        tool_id: String,
        text: String,
    },

    ToolEnd {
        tool_name: String,
        tool_id: String,
        tool_output: String,
        #[serde(default)]
        is_error: bool,
    },

    Result {
        result: String,
        usage: Usage,
        total_cost_usd: f64,
        num_turns: u32,
    },

    Error {
        error: String,
    },
}

impl StreamEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolDelta { .. } => "tool_delta",
            Self::ToolEnd { .. } => "tool_end",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
        }
    }
}

/// Receiver of a run's events.
///
/// Called inline on the run's task, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

impl<F> EventSink for F
where
    F: Fn(StreamEvent) + Send + Sync,
{
    fn emit(&self, event: StreamEvent) {
        self(event)
    }
}

/// Discards every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: StreamEvent) {}
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Event type names in order, handy for asserting sequences.
    pub fn types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(StreamEvent::event_type)
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: StreamEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_text_delta() {
        let event = StreamEvent::TextDelta {
            text: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"text_delta","text":"Hello"}"#);
    }

    #[test]
    fn event_serialization_tool_start_omits_missing_input() {
        let event = StreamEvent::ToolStart {
            tool_name: "Bash".into(),
            tool_id: "call_1".into(),
            tool_input: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_start""#));
        assert!(!json.contains("tool_input"));
    }

    #[test]
    fn event_serialization_result() {
        let event = StreamEvent::Result {
            result: "done".into(),
            usage: Usage::new(10, 20),
            total_cost_usd: 0.5,
            num_turns: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["usage"]["output_tokens"], 20);
        assert_eq!(json["num_turns"], 2);
    }

    #[test]
    fn event_roundtrip_init() {
        let event: StreamEvent = serde_json::from_str(r#"{"type":"init"}"#).unwrap();
        assert_eq!(event, StreamEvent::Init);
        assert_eq!(event.event_type(), "init");
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |e: StreamEvent| seen.lock().unwrap().push(e.event_type());
        sink.emit(StreamEvent::Init);
        sink.emit(StreamEvent::Error {
            error: "boom".into(),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["init", "error"]);
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.emit(StreamEvent::Init);
        sink.emit(StreamEvent::TextDelta { text: "a".into() });
        assert_eq!(sink.types(), vec!["init", "text_delta"]);
        assert_eq!(sink.events().len(), 2);
    }
}
