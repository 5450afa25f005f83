//! §4.3.2 tool argument preview: renders a tool invocation's arguments as a
//! short, display-friendly string (≤ 60 characters) for [`crate::progress`].

use serde_json::{Map, Value};

/// Hard cap applied to every preview string, regardless of the per-tool rule
/// that produced it.
pub const MAX_PREVIEW_LEN: usize = 60;

/// Build a preview string for `tool` given its `args` object from the event
/// stream (§6.2). Unknown tools fall through to the generic fallback rule.
pub fn build_preview(tool: &str, args: &Map<String, Value>) -> String {
    let preview = match tool {
        "read" => preview_read(args),
        "write" => preview_write(args),
        "edit" => preview_edit(args),
        "bash" => preview_bash(args),
        "grep" | "rg" => preview_grep(args),
        "find" => preview_find(args),
        "mcp" => preview_mcp(args),
        "subagent" => preview_subagent(args),
        "todo" => preview_todo(args),
        _ => preview_fallback(args),
    };
    cap(&preview, MAX_PREVIEW_LEN)
}

fn as_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn as_u64(args: &Map<String, Value>, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

fn preview_read(args: &Map<String, Value>) -> String {
    let path = as_str(args, "path").unwrap_or("");
    let mut preview = tail_truncate(path, 50);
    if args.contains_key("offset") || args.contains_key("limit") {
        let offset = as_u64(args, "offset").unwrap_or(1);
        let limit = as_u64(args, "limit").unwrap_or(100);
        preview.push_str(&format!(" [{}-{}]", offset, offset + limit));
    }
    preview
}

fn preview_write(args: &Map<String, Value>) -> String {
    let path = as_str(args, "path").unwrap_or("");
    let mut preview = tail_truncate(path, 40);
    if let Some(content) = as_str(args, "content") {
        preview.push_str(&format!(" ({} chars)", content.chars().count()));
    }
    preview
}

fn preview_edit(args: &Map<String, Value>) -> String {
    let path = as_str(args, "path").unwrap_or("");
    tail_truncate(path, 50)
}

fn preview_bash(args: &Map<String, Value>) -> String {
    let command = as_str(args, "command").unwrap_or("");
    head_truncate(command, 60)
}

fn preview_grep(args: &Map<String, Value>) -> String {
    let pattern = as_str(args, "pattern").unwrap_or("");
    let mut preview = pattern.to_owned();
    if let Some(path) = as_str(args, "path") {
        preview.push_str(" in ");
        preview.push_str(path);
    }
    head_truncate(&preview, 60)
}

fn preview_find(args: &Map<String, Value>) -> String {
    let path = as_str(args, "path").unwrap_or("");
    let mut preview = path.to_owned();
    if let Some(name) = as_str(args, "name") {
        preview.push_str(&format!(" -name \"{name}\""));
    }
    head_truncate(&preview, 60)
}

fn preview_mcp(args: &Map<String, Value>) -> String {
    for key in ["tool", "search", "server"] {
        if let Some(value) = as_str(args, key) {
            return format!("{key}: {value}");
        }
    }
    String::new()
}

fn preview_subagent(args: &Map<String, Value>) -> String {
    if let Some(task) = as_str(args, "task") {
        return head_truncate(task, 50);
    }
    if let Some(agent) = as_str(args, "agent") {
        return format!("agent: {agent}");
    }
    String::new()
}

fn preview_todo(args: &Map<String, Value>) -> String {
    let action = as_str(args, "action").unwrap_or("");
    let mut preview = action.to_owned();
    if let Some(title) = as_str(args, "title") {
        preview.push_str(": ");
        preview.push_str(&head_truncate(title, 40));
    } else if let Some(id) = as_str(args, "id") {
        preview.push_str(": ");
        preview.push_str(id);
    }
    preview
}

/// Fallback used for unrecognized tools: try a fixed key order, else fall
/// back to the first string-valued entry in the map.
const FALLBACK_KEYS: &[&str] = &[
    "command", "path", "file", "pattern", "query", "url", "task", "prompt", "name", "action",
];

fn preview_fallback(args: &Map<String, Value>) -> String {
    for key in FALLBACK_KEYS {
        if let Some(value) = as_str(args, key) {
            return value.to_owned();
        }
    }
    for (key, value) in args {
        if let Some(value) = value.as_str() {
            return format!("{key}: {value}");
        }
    }
    String::new()
}

/// Keep the first `max_chars` characters, appending `"..."` if truncated.
fn head_truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Keep the last `max_chars` characters, prepending `"..."` if truncated.
fn tail_truncate(s: &str, max_chars: usize) -> String {
    let total = s.chars().count();
    if total <= max_chars {
        return s.to_owned();
    }
    let tail: String = s.chars().skip(total - max_chars).collect();
    format!("...{tail}")
}

/// Cap `s` at `max_chars`, appending `"..."` when truncation occurs (applied
/// last, after any per-tool rule has already built its own preview).
fn cap(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
