//! Server-sent event decoding for streamed completions.
//!
//! The provider hands over raw lines; this module turns them into text,
//! reconstructed tool calls, usage and a finish reason, emitting events as
//! it goes.

use std::collections::BTreeMap;

use ironloom_core::{ChunkStream, ProviderError, ToolCall, Usage};
use serde::Deserialize;
use tracing::trace;

use crate::stream_event::{EventSink, StreamEvent};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Everything one streamed turn produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamResult {
    pub text: String,
    /// Ordered by the index the provider assigned.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: FunctionDelta,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Default)]
struct ToolAccumulator {
    id: String,
    name: String,
    arguments: String,
    started: bool,
}

/// Incremental decoder for one streamed turn.
pub struct StreamDecoder<'a> {
    sink: &'a dyn EventSink,
    text: String,
    tools: BTreeMap<u32, ToolAccumulator>,
    usage: Usage,
    finish_reason: Option<String>,
    initialized: bool,
}

impl<'a> StreamDecoder<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            sink,
            text: String::new(),
            tools: BTreeMap::new(),
            usage: Usage::default(),
            finish_reason: None,
            initialized: false,
        }
    }

    /// Drain `lines` until the terminator or channel close.
    ///
    /// A transport error from the channel aborts the decode.
    pub async fn decode(
        lines: &mut ChunkStream,
        sink: &'a dyn EventSink,
    ) -> Result<StreamResult, ProviderError> {
        let mut decoder = Self::new(sink);
        while let Some(line) = lines.recv().await {
            if decoder.feed_line(&line?) {
                break;
            }
        }
        Ok(decoder.finish())
    }

    /// Process one raw line. Returns `true` once the terminator is seen.
    pub fn feed_line(&mut self, line: &str) -> bool {
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return false;
        };
        let data = data.trim_end();
        if data == DONE_MARKER {
            return true;
        }

        let chunk: Chunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                trace!(error = %e, "Skipping malformed stream chunk");
                return false;
            }
        };

        if !self.initialized {
            self.sink.emit(StreamEvent::Init);
            self.initialized = true;
        }

        if let Some(usage) = &chunk.usage {
            self.usage = Usage::new(usage.prompt_tokens, usage.completion_tokens);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return false;
        };

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            self.text.push_str(&content);
            self.sink.emit(StreamEvent::TextDelta { text: content });
        }

        for delta in choice.delta.tool_calls {
            self.merge_tool_delta(delta);
        }

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
        false
    }

    fn merge_tool_delta(&mut self, delta: ToolCallDelta) {
        let acc = self.tools.entry(delta.index).or_default();

        if let Some(id) = delta.id.filter(|s| !s.is_empty()) {
            acc.id = id;
        }
        if let Some(name) = delta.function.name.filter(|s| !s.is_empty()) {
            acc.name = name;
        }
        let fragment = delta.function.arguments.unwrap_or_default();
        acc.arguments.push_str(&fragment);

        if !acc.started && !acc.name.is_empty() {
            acc.started = true;
            self.sink.emit(StreamEvent::ToolStart {
                tool_name: acc.name.clone(),
                tool_id: acc.id.clone(),
                tool_input: None,
            });
        }

        if acc.started && !fragment.is_empty() {
            self.sink.emit(StreamEvent::ToolDelta {
                tool_name: acc.name.clone(),
                tool_id: String::new(),
                text: fragment,
            });
        }
    }

    /// Flatten the accumulated state.
    pub fn finish(self) -> StreamResult {
        StreamResult {
            text: self.text,
            tool_calls: self
                .tools
                .into_values()
                .map(|acc| ToolCall::new(acc.id, acc.name, acc.arguments))
                .collect(),
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}
