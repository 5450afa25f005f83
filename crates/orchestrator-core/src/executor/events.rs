//! §6.2 event stream: newline-delimited JSON emitted by the `pi` subprocess.

use serde::Deserialize;
use serde_json::{Map, Value};

/// One content part of an assistant (or other-role) message. Only `"text"`
/// parts carry meaningful payload per §6.2; other kinds are preserved for
/// completeness but contribute no text.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

/// Token/cost usage reported on a `message_end` event. Missing sub-fields
/// default to zero per §6.2.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default, rename = "cacheRead")]
    pub cache_read: u64,
    #[serde(default, rename = "cacheWrite")]
    pub cache_write: u64,
    #[serde(default)]
    pub cost: Option<EventCost>,
    #[serde(default, rename = "totalTokens")]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventCost {
    #[serde(default)]
    pub total: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    pub usage: Option<EventUsage>,
    #[serde(rename = "stopReason")]
    pub stop_reason: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

/// A single recognized event from the child's stdout. Anything that doesn't
/// parse into one of these (malformed JSON, or a recognized shape with an
/// unrecognized `type`) is discarded by [`parse_event_line`], never surfaced
/// as a variant here.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    MessageEnd(EventMessage),
    ToolExecutionStart {
        tool_name: String,
        args: Map<String, Value>,
    },
    ToolExecutionEnd,
    ToolResultEnd {
        message: Option<EventMessage>,
    },
}

/// Raw wire shape used only to discriminate on `type` before deserializing
/// into the right variant.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    message: Option<EventMessage>,
    #[serde(rename = "toolName")]
    tool_name: Option<String>,
    #[serde(default)]
    args: Option<Map<String, Value>>,
}

/// Parse one line of the child's stdout into an [`AgentEvent`].
///
/// Unparseable lines and lines with an unrecognized `type` are discarded
/// silently (return `None`), per §6.2. Blank lines are also discarded.
pub fn parse_event_line(line: &str) -> Option<AgentEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let raw: RawEvent = serde_json::from_str(line).ok()?;

    match raw.kind.as_str() {
        "message_end" => Some(AgentEvent::MessageEnd(raw.message?)),
        "tool_execution_start" => Some(AgentEvent::ToolExecutionStart {
            tool_name: raw.tool_name?,
            args: raw.args.unwrap_or_default(),
        }),
        "tool_execution_end" => Some(AgentEvent::ToolExecutionEnd),
        "tool_result_end" => Some(AgentEvent::ToolResultEnd {
            message: raw.message,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assistant_message_end() {
        let line = r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"hi"}],"usage":{"input":10,"output":5}}}"#;
        match parse_event_line(line) {
            Some(AgentEvent::MessageEnd(msg)) => {
                assert_eq!(msg.role, "assistant");
                assert_eq!(msg.content[0].text.as_deref(), Some("hi"));
                assert_eq!(msg.usage.unwrap().input, 10);
            }
            other => panic!("expected MessageEnd, got {other:?}"),
        }
    }

    #[test]
    fn parses_tool_execution_start() {
        let line = r#"{"type":"tool_execution_start","toolName":"bash","args":{"command":"ls"}}"#;
        match parse_event_line(line) {
            Some(AgentEvent::ToolExecutionStart { tool_name, args }) => {
                assert_eq!(tool_name, "bash");
                assert_eq!(args.get("command").unwrap().as_str(), Some("ls"));
            }
            other => panic!("expected ToolExecutionStart, got {other:?}"),
        }
    }

    #[test]
    fn parses_tool_execution_end() {
        let line = r#"{"type":"tool_execution_end"}"#;
        assert!(matches!(
            parse_event_line(line),
            Some(AgentEvent::ToolExecutionEnd)
        ));
    }

    #[test]
    fn parses_tool_result_end_with_message() {
        let line = r#"{"type":"tool_result_end","message":{"role":"tool","content":[]}}"#;
        match parse_event_line(line) {
            Some(AgentEvent::ToolResultEnd { message: Some(m) }) => assert_eq!(m.role, "tool"),
            other => panic!("expected ToolResultEnd with message, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_discarded() {
        let line = r#"{"type":"some_future_event","foo":"bar"}"#;
        assert!(parse_event_line(line).is_none());
    }

    #[test]
    fn malformed_json_is_discarded() {
        assert!(parse_event_line("not json at all {{{").is_none());
    }

    #[test]
    fn blank_line_is_discarded() {
        assert!(parse_event_line("").is_none());
        assert!(parse_event_line("   ").is_none());
    }

    #[test]
    fn missing_usage_subfields_default_to_zero() {
        let line = r#"{"type":"message_end","message":{"role":"assistant","content":[],"usage":{}}}"#;
        match parse_event_line(line) {
            Some(AgentEvent::MessageEnd(msg)) => {
                let usage = msg.usage.unwrap();
                assert_eq!(usage.input, 0);
                assert_eq!(usage.cache_read, 0);
                assert_eq!(usage.total_tokens, 0);
            }
            other => panic!("expected MessageEnd, got {other:?}"),
        }
    }

    #[test]
    fn error_message_and_stop_reason_are_captured() {
        let line = r#"{"type":"message_end","message":{"role":"assistant","content":[],"stopReason":"error","errorMessage":"auth failed"}}"#;
        match parse_event_line(line) {
            Some(AgentEvent::MessageEnd(msg)) => {
                assert_eq!(msg.stop_reason.as_deref(), Some("error"));
                assert_eq!(msg.error_message.as_deref(), Some("auth failed"));
            }
            other => panic!("expected MessageEnd, got {other:?}"),
        }
    }
}
