//! Context-growth control for tool output.
//!
//! Tool results can be huge (screenshots, page dumps, build logs). Fresh
//! results are capped before they enter the conversation, and results the
//! model has already answered are shrunk further on later turns.

use ironloom_core::{Message, Role};
use serde_json::Value;

/// Cap applied to every new tool message.
pub const MAX_TOOL_OUTPUT_BYTES: usize = 8192;

/// Old tool messages above this size are shrunk.
pub const OLD_TOOL_RESULT_THRESHOLD: usize = 2000;

/// Bytes of an old tool message kept after shrinking.
pub const OLD_TOOL_RESULT_KEEP: usize = 500;

/// Conversations shorter than this are left alone.
pub const MIN_MESSAGES_FOR_TRUNCATION: usize = 6;

const OLD_TOOL_RESULT_MARKER: &str = "\n...[truncated large tool output]...";

const BINARY_FIELDS: &[&str] = &[
    "image_base64",
    "pdf_base64",
    "image_data",
    "imageData",
    "screenshot",
    "base64",
    "data",
];

const MIN_BINARY_LEN: usize = 500;
const BASE64_SAMPLE: usize = 200;

/// Largest index `<= at` that falls on a char boundary of `s`.
fn floor_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut i = at;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest index `>= at` that falls on a char boundary of `s`.
fn ceil_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut i = at;
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn looks_like_base64(s: &str) -> bool {
    if s.len() < MIN_BINARY_LEN {
        return false;
    }
    let sample: String = s
        .bytes()
        .take(BASE64_SAMPLE)
        .filter(|b| *b != b'\n' && *b != b'\r')
        .map(char::from)
        .collect();
    sample.len() >= BASE64_SAMPLE
        && sample
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b.is_ascii_whitespace())
}

/// Replace base64 payloads in well-known fields of a JSON object output.
///
/// Anything that is not a top-level JSON object, or has nothing to strip,
/// is returned unchanged.
pub fn strip_binary_fields(output: &str) -> String {
    let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(output) else {
        return output.to_string();
    };

    let mut stripped = false;
    for field in BINARY_FIELDS {
        if let Some(Value::String(s)) = map.get(*field)
            && looks_like_base64(s)
        {
            let kb = s.len() * 3 / 4 / 1024;
            map.insert(
                (*field).to_string(),
                Value::String(format!("[binary data stripped: {kb}KB, displayed in widget]")),
            );
            stripped = true;
        }
    }

    if !stripped {
        return output.to_string();
    }
    serde_json::to_string(&Value::Object(map)).unwrap_or_else(|_| output.to_string())
}

/// Keep the head (two thirds) and tail (a quarter) of `output`.
pub fn truncate_tool_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let head_end = floor_boundary(output, max_bytes * 2 / 3);
    let tail_start = ceil_boundary(output, output.len() - max_bytes / 4);
    let dropped_kb = (tail_start - head_end) / 1024;

    format!(
        "{}\n\n...[truncated {dropped_kb}KB of tool output for context management; \
         full output displayed in widget]...\n\n{}",
        &output[..head_end],
        &output[tail_start..]
    )
}

/// Shrink tool results that precede the latest assistant message.
///
/// Results after the last assistant message have not been seen by the model
/// yet and are kept whole. Running this twice changes nothing the second
/// time.
pub fn truncate_old_tool_results(messages: &mut [Message]) {
    if messages.len() < MIN_MESSAGES_FOR_TRUNCATION {
        return;
    }
    let Some(last_assistant) = messages
        .iter()
        .rposition(|m| m.role == Role::Assistant)
    else {
        return;
    };

    for message in &mut messages[..last_assistant] {
        if !message.is_tool() || message.content.len() <= OLD_TOOL_RESULT_THRESHOLD {
            continue;
        }
        let stripped = strip_binary_fields(&message.content);
        if stripped.len() <= OLD_TOOL_RESULT_THRESHOLD {
            message.content = stripped;
            continue;
        }
        let keep = floor_boundary(&stripped, OLD_TOOL_RESULT_KEEP);
        message.content = format!("{}{OLD_TOOL_RESULT_MARKER}", &stripped[..keep]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironloom_core::ToolCall;

    fn b64(len: usize) -> String {
        "QUJD".repeat(len / 4 + 1)[..len].to_string()
    }

    fn conversation(tool_output: &str) -> Vec<Message> {
        vec![
            Message::system("sys"),
            Message::user("go"),
            Message::assistant_with_tools("", vec![ToolCall::new("c1", "Bash", "{}")]),
            Message::tool_result("c1", tool_output),
            Message::assistant_with_tools("", vec![ToolCall::new("c2", "Bash", "{}")]),
            Message::tool_result("c2", tool_output),
        ]
    }

    #[test]
    fn strips_known_base64_fields() {
        let payload = serde_json::json!({
            "screenshot": b64(4096),
            "title": "page",
        })
        .to_string();
        let out = strip_binary_fields(&payload);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["title"], "page");
        assert_eq!(
            value["screenshot"],
            "[binary data stripped: 3KB, displayed in widget]"
        );
    }

    #[test]
    fn leaves_short_or_non_base64_values() {
        let short = serde_json::json!({"data": b64(100)}).to_string();
        assert_eq!(strip_binary_fields(&short), short);

        let prose = serde_json::json!({"data": "hello world! ".repeat(100)}).to_string();
        assert_eq!(strip_binary_fields(&prose), prose);

        let other_field = serde_json::json!({"body": b64(4096)}).to_string();
        assert_eq!(strip_binary_fields(&other_field), other_field);

        assert_eq!(strip_binary_fields("plain text"), "plain text");
        assert_eq!(strip_binary_fields("[1,2,3]"), "[1,2,3]");
    }

    #[test]
    fn truncate_keeps_head_and_tail() {
        let output: String = (0..20_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let out = truncate_tool_output(&output, MAX_TOOL_OUTPUT_BYTES);
        assert!(out.starts_with(&output[..5461]));
        assert!(out.ends_with(&output[output.len() - 2048..]));
        assert!(out.contains("...[truncated 12KB of tool output"));
        assert!(out.len() < output.len());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let output = "é".repeat(10_000);
        let out = truncate_tool_output(&output, 1001);
        assert!(out.starts_with('é'));
        assert!(out.ends_with('é'));
    }

    #[test]
    fn small_output_untouched() {
        assert_eq!(truncate_tool_output("short", 8192), "short");
    }

    #[test]
    fn old_results_shrink_but_latest_stays() {
        let big = "x".repeat(5000);
        let mut messages = conversation(&big);
        truncate_old_tool_results(&mut messages);

        assert_eq!(messages[3].content.len(), 500 + OLD_TOOL_RESULT_MARKER.len());
        assert!(messages[3].content.ends_with(OLD_TOOL_RESULT_MARKER));
        assert_eq!(messages[5].content, big);
    }

    #[test]
    fn old_binary_result_is_stripped_instead_of_cut() {
        let payload = serde_json::json!({"image_base64": b64(8000), "ok": true}).to_string();
        let mut messages = conversation(&payload);
        truncate_old_tool_results(&mut messages);
        assert!(messages[3].content.contains("binary data stripped"));
        assert!(messages[3].content.contains("\"ok\":true"));
        assert!(!messages[3].content.contains(OLD_TOOL_RESULT_MARKER));
    }

    #[test]
    fn short_conversations_are_skipped() {
        let big = "x".repeat(5000);
        let mut messages = conversation(&big);
        messages.truncate(5);
        truncate_old_tool_results(&mut messages);
        assert_eq!(messages[3].content, big);
    }

    #[test]
    fn truncation_is_idempotent() {
        let big = "y".repeat(9000);
        let mut once = conversation(&big);
        truncate_old_tool_results(&mut once);
        let mut twice = once.clone();
        truncate_old_tool_results(&mut twice);
        assert_eq!(once, twice);
    }
}
